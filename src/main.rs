use anyhow::{Context, Result};
use clap::Parser;
use std::{io::Cursor, path::PathBuf};

use musparser::{
    midi::{format_duration, summarize},
    mus_to_midi,
    wad::Wad,
};

#[derive(Parser, Debug)]
#[command(name = "musparser", about = "Convert a MUS music file to a Format-0 MIDI file")]
struct Opt {
    /// MUS file to read (a WAD when --lump is given)
    infile: PathBuf,
    /// MIDI file to write
    outfile: PathBuf,
    /// Convert this music lump out of the WAD (RUNNIN, D_RUNNIN, E1M1...)
    #[arg(long)]
    lump: Option<String>,
    /// Log every decoded event
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    let level = if opt.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let conversion = match &opt.lump {
        Some(query) => {
            let mut wad = Wad::open(&opt.infile)
                .with_context(|| format!("opening {:?}", opt.infile))?;
            let name = wad
                .find_music(query)
                .map(|l| l.name.clone())
                .with_context(|| {
                    let known: Vec<_> = wad.music_lumps().map(|l| l.name.as_str()).collect();
                    format!("no music lump matching {query:?}; available: {}", known.join(" "))
                })?;
            let bytes = wad.read(&name)?;
            println!("Read {}: {} bytes", name, bytes.len());
            mus_to_midi(Cursor::new(bytes)).with_context(|| format!("converting {name}"))?
        }
        None => musparser::read_mus_file(&opt.infile)
            .with_context(|| format!("converting {:?}", opt.infile))?,
    };

    println!("{:?}", conversion.header);
    println!("Instruments: {:?}", conversion.instruments);

    musparser::write_midi_file(&opt.outfile, &conversion.midi)?;

    match summarize(&conversion.midi) {
        Ok(s) => {
            let notes: usize = s.note_ons.iter().sum();
            println!(
                "Wrote {:?}: {} events, {} notes, {} ticks @ {} PPQ (~{} at 120 BPM)",
                opt.outfile,
                s.events,
                notes,
                s.ticks,
                s.division,
                format_duration(s.duration_us)
            );
        }
        Err(e) => log::warn!("could not read back {:?}: {e}", opt.outfile),
    }

    println!("done");
    Ok(())
}
