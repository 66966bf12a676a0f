use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;
use serde_json::Value;

use super::ExportError;
use crate::gpu::{GpuStats, Logged, Origin};
use crate::gte::GteState;
use crate::logger::GpuLogger;
use crate::utils::{serialize_hex_u32, serialize_hex_words};

#[derive(Serialize)]
struct FrameDocument<'a> {
    frame: u64,
    gte: &'a [GteState],
    commands: Vec<CommandRecord<'a>>,
    stats: GpuStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandRecord<'a> {
    command: &'static str,
    origin: Origin,
    frame: u64,
    #[serde(serialize_with = "serialize_hex_u32")]
    pc: u32,
    #[serde(serialize_with = "serialize_hex_u32")]
    source_address: u32,
    length: u32,
    #[serde(serialize_with = "serialize_hex_words")]
    words: &'a [u32],
    words_truncated: bool,
    enabled: bool,
    highlight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gte: Option<&'a GteState>,
    details: Value,
}

impl<'a> CommandRecord<'a> {
    fn new(logged: &'a Logged) -> Self {
        Self {
            command: logged.command.name(),
            origin: logged.origin(),
            frame: logged.frame(),
            pc: logged.pc(),
            source_address: logged.source_addr(),
            length: logged.length(),
            words: logged.words(),
            words_truncated: logged.words_truncated(),
            enabled: logged.enabled(),
            highlight: logged.highlight(),
            gte: logged.gte_state(),
            details: logged.command.details(),
        }
    }
}

fn frame_document(logger: &GpuLogger) -> FrameDocument<'_> {
    FrameDocument {
        frame: logger.frame(),
        gte: logger.gte_frame_log(),
        commands: logger.iter().map(CommandRecord::new).collect(),
        stats: logger.stats(),
    }
}

/// The logged frame as a JSON value, the same document [`save_frame_log_json`] writes.
pub fn frame_log_json(logger: &GpuLogger) -> Result<Value, ExportError> {
    Ok(serde_json::to_value(frame_document(logger))?)
}

/// Write the logged frame, its GTE operations and statistics as a JSON document.
///
/// On error, the partially written file is left as is.
pub fn save_frame_log_json<P: AsRef<Path>>(logger: &GpuLogger, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();

    let mut output = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut output, &frame_document(logger))?;
    output.flush()?;

    log::info!(
        "saved {} commands and {} GTE operations of frame {} to {}",
        logger.len(),
        logger.gte_frame_log().len(),
        logger.frame(),
        path.display()
    );
    Ok(())
}
