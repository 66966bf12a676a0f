use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use gpulog_core::{read_frame_log, GpuCommand, LogEntry};

#[derive(Parser, Debug)]
#[command(
    name = "gpulog",
    version,
    about = "Print the records of a binary GPU frame log"
)]
struct Args {
    /// Frame log file, as written by `save_frame_log`
    file: PathBuf,

    /// Only print the records of this frame
    #[arg(long, value_name = "N")]
    frame: Option<u32>,

    /// Print at most this many records
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Print the command words kept in each record
    #[arg(long, action = clap::ArgAction::SetTrue)]
    words: bool,
}

fn command_name(entry: &LogEntry) -> &'static str {
    let kept = (entry.word_count as usize).min(entry.packet_words.len());
    // GP1 commands are logged with the same layout, but can't be told apart here
    GpuCommand::from_gp0(&entry.packet_words[..kept])
        .map(|command| command.name())
        .unwrap_or("-")
}

fn has_gte_state(entry: &LogEntry) -> bool {
    entry.h != 0
        || entry.rot.iter().flatten().any(|&v| v != 0)
        || entry.vx.iter().chain(&entry.vy).chain(&entry.vz).any(|&v| v != 0)
}

fn print_entry(index: usize, entry: &LogEntry, words: bool) {
    println!(
        "{:5} frame={} pc={:08X} cmd={:08X} type={:02X} {:<24} words={}",
        index,
        entry.frame,
        entry.pc,
        entry.gp0_cmd,
        entry.primitive_type,
        command_name(entry),
        entry.word_count
    );

    if words {
        let kept = (entry.word_count as usize).min(entry.packet_words.len());
        let words = entry.packet_words[..kept]
            .iter()
            .map(|w| format!("{:08X}", w))
            .collect::<Vec<_>>()
            .join(" ");
        println!("      [{}]", words);
    }

    if has_gte_state(entry) {
        for i in 0..3 {
            println!(
                "      v{}=({}, {}, {}) -> s{}=({}, {})",
                i, entry.vx[i], entry.vy[i], entry.vz[i], i, entry.sx[i], entry.sy[i]
            );
        }
        println!(
            "      tr=({}, {}, {}) of=({}, {}) h={} dqa={} dqb={}",
            entry.translation[0],
            entry.translation[1],
            entry.translation[2],
            entry.ofx,
            entry.ofy,
            entry.h,
            entry.dqa,
            entry.dqb
        );
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let frame_log = match read_frame_log(&args.file) {
        Ok(frame_log) => frame_log,
        Err(e) => {
            log::error!("could not read {}: {}", args.file.display(), e);
            exit(1);
        }
    };

    let metadata = &frame_log.metadata;
    println!(
        "{}: {} entries, {} bytes each, version {}",
        args.file.display(),
        metadata.entry_count,
        metadata.log_entry_size,
        metadata.metadata_version
    );

    let entries = frame_log
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| args.frame.map_or(true, |frame| entry.frame == frame))
        .take(args.limit.unwrap_or(usize::MAX));

    let mut printed = 0;
    for (index, entry) in entries {
        print_entry(index, entry, args.words);
        printed += 1;
    }

    if printed == 0 {
        log::warn!("no entries matched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_polyline_name() {
        // the terminator of a long polyline is past the kept words
        let mut packet_words = [0x0000_0000; 12];
        packet_words[0] = 0x4800_FFFF;
        let entry = LogEntry {
            gp0_cmd: 0x4800_FFFF,
            primitive_type: 0x48,
            word_count: 12,
            packet_words,
            ..LogEntry::default()
        };
        assert_eq!(command_name(&entry), "Line");
    }

    #[test]
    fn decoded_name() {
        let mut packet_words = [0; 12];
        packet_words[..3].copy_from_slice(&[0x0211_2233, 0x0014_000A, 0x0005_0005]);
        let entry = LogEntry {
            gp0_cmd: 0x0211_2233,
            primitive_type: 0x02,
            word_count: 3,
            packet_words,
            ..LogEntry::default()
        };
        assert_eq!(command_name(&entry), "FastFill");
    }
}
