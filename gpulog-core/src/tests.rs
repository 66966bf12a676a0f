use crate::gpu::{BlitVramVram, FastFill};
use crate::*;

#[derive(Default)]
struct TestHost {
    pc: u32,
    no_vram: bool,
    acquired: usize,
    paused: usize,
}

impl EmulatorHost for TestHost {
    fn program_counter(&self) -> u32 {
        self.pc
    }

    fn pause(&mut self) {
        self.paused += 1;
    }

    fn acquire_vram(&mut self) -> Option<Vram> {
        self.acquired += 1;
        if self.no_vram {
            return None;
        }
        // tag each copy so tests can tell them apart
        let mut vram = Vram::new();
        vram.partial_update(0, 0, 1, 1, &[self.acquired as u16]);
        Some(vram)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplayEvent {
    VramUpdate { w: u32, h: u32, first_texel: u16 },
    Gp0(u32),
    Gp1(u32),
    Vblank(bool),
}

#[derive(Default)]
struct ReplayRecorder {
    events: Vec<ReplayEvent>,
}

impl ReplayTarget for ReplayRecorder {
    fn partial_update_vram(&mut self, _x: u32, _y: u32, w: u32, h: u32, block: &[u16]) {
        self.events.push(ReplayEvent::VramUpdate {
            w,
            h,
            first_texel: block[0],
        });
    }

    fn write_gp0(&mut self, data: u32) {
        self.events.push(ReplayEvent::Gp0(data));
    }

    fn write_gp1(&mut self, data: u32) {
        self.events.push(ReplayEvent::Gp1(data));
    }

    fn vblank(&mut self, from_replay: bool) {
        self.events.push(ReplayEvent::Vblank(from_replay));
    }
}

fn advance_to_frame(logger: &mut GpuLogger, host: &mut TestHost, frame: u64) {
    while logger.frame() < frame {
        logger.on_vsync(host);
    }
}

fn add_fill(logger: &mut GpuLogger, host: &mut TestHost, fill: FastFill) -> Option<usize> {
    logger.add(
        host,
        Logged::new(GpuCommand::FastFill(fill), Vec::new()),
        Origin::DataWrite,
        0x0211_2233,
        12,
    )
}

fn fill_words(color: u32, x: u32, y: u32, w: u32, h: u32) -> [u32; 3] {
    [0x0200_0000 | color, (y << 16) | x, (h << 16) | w]
}

#[test]
fn fast_fill_in_frame() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost {
        pc: 0x8001_0000,
        ..TestHost::default()
    };
    advance_to_frame(&mut logger, &mut host, 3);

    let index = add_fill(&mut logger, &mut host, FastFill::new(0x112233, 10, 20, 5, 5));
    assert_eq!(index, Some(0));
    assert_eq!(logger.len(), 1);

    let logged = logger.get(0).unwrap();
    assert_eq!(logged.frame(), 3);
    assert_eq!(logged.pc(), 0x8001_0000);
    assert_eq!(logged.words(), &[0x0211_2233]);
    assert_eq!(logged.stats().pixel_writes, 25);
    assert_eq!(logger.stats().pixel_writes, 25);

    let json = frame_log_json(&logger).unwrap();
    assert_eq!(json["frame"], 3);
    assert_eq!(json["commands"][0]["details"]["color"], "0x112233");
    assert_eq!(json["commands"][0]["pc"], "0x80010000");
    assert_eq!(json["stats"]["pixelWrites"], 25);
}

#[test]
fn blit_vram_vram_counts_both_ways() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    logger.add(
        &mut host,
        Logged::new(
            GpuCommand::BlitVramVram(BlitVramVram::new(0, 0, 100, 100, 8, 8)),
            Vec::new(),
        ),
        Origin::DirectDma,
        0x0010_0000,
        16,
    );

    let stats = logger.stats();
    assert_eq!(stats.pixel_reads, 64);
    assert_eq!(stats.pixel_writes, 64);
    assert_eq!(logger.get(0).unwrap().origin(), Origin::DirectDma);
    assert_eq!(logger.get(0).unwrap().source_addr(), 0x0010_0000);
}

#[test]
fn new_frame_evicts_old_entries() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    for i in 0..10 {
        let words = fill_words(0, 0, i * 16, 16, 16);
        logger.add_gp0(&mut host, &words, Origin::DataWrite, words[0], 12);
    }
    assert_eq!(logger.len(), 10);
    assert_eq!(host.acquired, 1);
    assert_eq!(logger.vram_baseline().unwrap().read(0, 0), 1);

    logger.on_vsync(&mut host);
    let words = fill_words(0, 0, 0, 16, 16);
    let index = logger.add_gp0(&mut host, &words, Origin::DataWrite, words[0], 12);

    assert_eq!(index, Some(0));
    assert_eq!(logger.len(), 1);
    assert!(logger.iter().all(|l| l.frame() == 1));
    assert_eq!(host.acquired, 2);
    assert_eq!(logger.vram_baseline().unwrap().read(0, 0), 2);
}

#[test]
fn clear_is_idempotent() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    logger.record_gte_state(GteState::default());

    logger.clear();
    assert!(logger.is_empty());
    assert!(logger.gte_frame_log().is_empty());
    assert!(logger.last_gte_state().is_none());

    logger.clear();
    assert!(logger.is_empty());
    assert_eq!(logger.stats(), GpuStats::default());
}

#[test]
fn capture_disabled() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    logger.set_capture(CaptureFlags::empty());

    assert_eq!(
        add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16)),
        None
    );
    assert_eq!(logger.add_gp1(&mut host, 0x0000_0000), None);
    logger.record_gte_state(GteState::default());

    assert!(logger.is_empty());
    assert!(logger.last_gte_state().is_none());
    assert_eq!(host.acquired, 0);
}

#[test]
fn break_on_vsync() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    logger.on_vsync(&mut host);
    assert_eq!(host.paused, 0);

    logger.set_capture(logger.capture() | CaptureFlags::BREAK_ON_VSYNC);
    logger.on_vsync(&mut host);
    assert_eq!(host.paused, 1);
    assert_eq!(logger.frame(), 2);
}

#[test]
fn unknown_commands_are_not_logged() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    // nop
    assert_eq!(
        logger.add_gp0(&mut host, &[0x0000_0000], Origin::DataWrite, 0, 4),
        None
    );
    // truncated fill
    assert_eq!(
        logger.add_gp0(&mut host, &[0x0200_0000, 0], Origin::DataWrite, 0, 8),
        None
    );
    assert!(logger.is_empty());
}

#[test]
fn gte_state_attached_to_commands() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    logger.set_capture(CaptureFlags::all() - CaptureFlags::BREAK_ON_VSYNC);

    logger.record_vertex_fetch(GteFetchContext {
        address: 0x8010_0000,
        ..GteFetchContext::default()
    });
    assert_eq!(logger.pending_vertex_fetches().len(), 1);

    logger.record_gte_state(GteState {
        command: GteOperation::Rtpt,
        pc: 0x8002_0000,
        ..GteState::default()
    });
    assert!(logger.pending_vertex_fetches().is_empty());

    // the first command of the frame doesn't drop the states recorded before it
    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    let state = logger.get(0).unwrap().gte_state().unwrap();
    assert_eq!(state.command, GteOperation::Rtpt);
    assert_eq!(state.metadata.vertex_fetches.len(), 1);
    assert_eq!(logger.gte_frame_log().len(), 1);

    let json = frame_log_json(&logger).unwrap();
    assert_eq!(json["gte"][0]["command"], "RTPT");
    assert_eq!(json["gte"][0]["pc"], "0x80020000");
    assert_eq!(
        json["gte"][0]["vertexFetches"][0]["address"],
        "0x80100000"
    );
    assert_eq!(json["commands"][0]["gte"]["command"], "RTPT");

    // the next frame starts with a clean trace
    logger.on_vsync(&mut host);
    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    assert!(logger.get(0).unwrap().gte_state().is_none());
    assert!(logger.gte_frame_log().is_empty());
}

#[test]
fn eviction_resets_gte_tracking() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    logger.on_vsync(&mut host);

    logger.record_gte_state(GteState {
        command: GteOperation::Rtpt,
        ..GteState::default()
    });
    assert_eq!(logger.gte_frame_log().len(), 1);

    // evicts the frame 0 fill
    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    assert_eq!(logger.len(), 1);
    assert!(logger.gte_frame_log().is_empty());
    assert!(logger.last_gte_state().is_none());
    assert!(logger.get(0).unwrap().gte_state().is_none());
}

#[test]
fn textured_rectangle_uses_draw_mode_page() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    // texture page x=2 (128), 16bit
    logger.add_gp0(&mut host, &[0xE100_0102], Origin::DataWrite, 0xE100_0102, 4);
    // 16x16 textured sprite at (0, 0), uv (4, 8)
    let words = [0x7C00_0000, 0x0000_0000, 0x0000_0804];
    logger.add_gp0(&mut host, &words, Origin::DataWrite, words[0], 12);

    let sprite = logger.get(1).unwrap();
    let GpuCommand::Primitive(primitive) = &sprite.command else {
        panic!("expected a primitive");
    };
    assert_eq!(primitive.tpage.map(|t| t.tx), Some(2));

    let mut reads = Vec::new();
    sprite.get_vertices(&mut |a, b, c| reads.push([a, b, c]), PixelOp::Read);
    assert_eq!(reads[0][0], Vertex::new(132, 8));
    assert_eq!(reads[0][2], Vertex::new(148, 24));
    assert_eq!(logger.stats().sprites, 1);
}

#[test]
fn entry_flags() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    add_fill(&mut logger, &mut host, FastFill::new(0, 16, 0, 16, 16));

    for mut entry in logger.iter_mut() {
        entry.set_enabled(false);
    }
    logger.get_mut(1).unwrap().set_highlight(true);

    assert!(logger.iter().all(|l| !l.enabled()));
    assert!(!logger.get(0).unwrap().highlight());
    assert!(logger.get(1).unwrap().highlight());
    assert!(logger.get_mut(2).is_none());
}

#[test]
fn replay_order() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    let fill = fill_words(0x00FF00, 0, 0, 16, 16);
    logger.add_gp0(&mut host, &fill, Origin::DataWrite, fill[0], 12);
    logger.add_gp1(&mut host, 0x0300_0000);
    let skipped = fill_words(0x0000FF, 32, 0, 16, 16);
    logger.add_gp0(&mut host, &skipped, Origin::DataWrite, skipped[0], 12);
    logger.add_gp0(&mut host, &[0xE100_0000], Origin::DataWrite, 0xE100_0000, 4);
    logger.get_mut(2).unwrap().set_enabled(false);

    let mut recorder = ReplayRecorder::default();
    logger.replay(&mut recorder);

    assert_eq!(
        recorder.events,
        vec![
            ReplayEvent::VramUpdate {
                w: 1024,
                h: 512,
                first_texel: 1
            },
            ReplayEvent::Gp0(fill[0]),
            ReplayEvent::Gp0(fill[1]),
            ReplayEvent::Gp0(fill[2]),
            ReplayEvent::Gp1(0x0300_0000),
            ReplayEvent::Gp0(0xE100_0000),
            ReplayEvent::Vblank(true),
        ]
    );

    // replaying doesn't change the log
    assert_eq!(logger.len(), 4);
}

#[test]
fn replay_without_baseline() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost {
        no_vram: true,
        ..TestHost::default()
    };

    logger.add_gp1(&mut host, 0x0100_0000);
    assert!(logger.vram_baseline().is_none());

    let mut recorder = ReplayRecorder::default();
    logger.replay(&mut recorder);
    assert_eq!(
        recorder.events,
        vec![ReplayEvent::Gp1(0x0100_0000), ReplayEvent::Vblank(true)]
    );

    // the missing baseline is not retried in the same frame
    logger.add_gp1(&mut host, 0x0200_0000);
    assert_eq!(host.acquired, 1);
}

#[test]
fn binary_export() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost {
        pc: 0x8003_0000,
        ..TestHost::default()
    };
    advance_to_frame(&mut logger, &mut host, 5);

    logger.record_gte_state(GteState {
        command: GteOperation::Rtps,
        input: GteSnapshot {
            vertices: [[1, 2, 3], [4, 5, 6], [7, 8, 9]],
            depth_queue_b: 0x0012_3456,
            ..GteSnapshot::default()
        },
        output: GteSnapshot {
            screen_coords: [[10, 11], [12, 13], [14, 15]],
            ..GteSnapshot::default()
        },
        ..GteState::default()
    });

    let fill = fill_words(0x112233, 16, 32, 16, 16);
    logger.add_gp0(&mut host, &fill, Origin::DataWrite, fill[0], 12);
    logger.add_gp1(&mut host, 0x0800_0001);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.bin");
    save_frame_log(&logger, &path).unwrap();

    let file_len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(file_len, 2 * 168 + 32);

    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert!(text.contains("Entry count: 2"));
    assert!(text.contains("LogEntry size (bytes): 168"));

    let log = read_frame_log(&path).unwrap();
    assert_eq!(log.metadata.entry_count, 2);
    assert_eq!(log.metadata.log_entry_size, 168);
    assert_eq!(log.metadata.metadata_version, 1);

    let entry = &log.entries[0];
    assert_eq!(entry.frame, 5);
    assert_eq!(entry.pc, 0x8003_0000);
    assert_eq!(entry.gp0_cmd, fill[0]);
    assert_eq!(entry.primitive_type, 0x02);
    assert_eq!(entry.word_count, 3);
    assert_eq!(&entry.packet_words[..4], &[fill[0], fill[1], fill[2], 0]);
    assert_eq!(entry.vx, [1, 4, 7, 0]);
    assert_eq!(entry.vz, [3, 6, 9, 0]);
    assert_eq!(entry.sy, [11, 13, 15, 0]);
    assert_eq!(entry.dqb, 0x3456);
    assert_eq!(entry.clut, 0);

    assert_eq!(log.entries[1].primitive_type, 0x08);
}

#[test]
fn binary_export_to_text_path() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    let fill = fill_words(0x112233, 16, 32, 16, 16);
    logger.add_gp0(&mut host, &fill, Origin::DataWrite, fill[0], 12);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.txt");
    save_frame_log(&logger, &path).unwrap();

    let log = read_frame_log(&path).unwrap();
    assert_eq!(log.entries.len(), 1);
    let text = std::fs::read_to_string(dir.path().join("frame.txt.txt")).unwrap();
    assert!(text.contains("Entry count: 1"));
}

#[test]
fn binary_export_empty_log() {
    let logger = GpuLogger::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.log");
    save_frame_log(&logger, &path).unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
    let log = read_frame_log(&path).unwrap();
    assert!(log.entries.is_empty());
}

#[test]
fn json_export() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    add_fill(&mut logger, &mut host, FastFill::new(0x112233, 10, 20, 5, 5));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.json");
    save_frame_log_json(&logger, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"0x112233\""));

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let command = &json["commands"][0];
    assert_eq!(command["command"], "FastFill");
    assert_eq!(command["origin"], "DATA_WRITE");
    assert_eq!(command["words"][0], "0x02112233");
    assert_eq!(command["wordsTruncated"], false);
    assert_eq!(command["enabled"], true);
    assert!(command.get("gte").is_none());
    assert_eq!(command["details"]["rect"]["x"], 10);
    assert_eq!(json["stats"]["pixelWrites"], 25);
}

#[test]
fn json_export_unwritable_path() {
    let logger = GpuLogger::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("frame.json");
    assert!(matches!(
        save_frame_log_json(&logger, &path),
        Err(ExportError::Io(_))
    ));
}

#[test]
fn heatmaps_need_texture_units() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    assert!(!logger.enable_heatmaps(Box::new(SoftwareHeatmap::with_texture_units(4))));
    assert!(!logger.heatmaps_enabled());

    // logging goes on without them
    add_fill(&mut logger, &mut host, FastFill::new(0, 0, 0, 16, 16));
    assert_eq!(logger.len(), 1);
    logger.highlight(Some(0), true);
}

#[test]
fn heatmaps_track_coverage() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();
    assert!(logger.enable_heatmaps(Box::new(SoftwareHeatmap::new())));

    add_fill(&mut logger, &mut host, FastFill::new(0x112233, 10, 20, 5, 5));
    logger.add(
        &mut host,
        Logged::new(
            GpuCommand::BlitVramVram(BlitVramVram::new(100, 0, 200, 0, 2, 2)),
            Vec::new(),
        ),
        Origin::DataWrite,
        0x8000_0000,
        16,
    );

    let backend = logger.heatmap_backend().unwrap();
    let covered = |target: HeatmapTarget| {
        let mut count = 0;
        for y in 0..64 {
            for x in 0..256 {
                if backend.coverage(target, x, y) == Some(1.0) {
                    count += 1;
                }
            }
        }
        count
    };

    assert_eq!(covered(HeatmapTarget::WrittenHeatmap), 25 + 4);
    assert_eq!(covered(HeatmapTarget::ReadHeatmap), 4);
    assert_eq!(backend.coverage(HeatmapTarget::ReadHeatmap, 100, 0), Some(1.0));
    assert_eq!(covered(HeatmapTarget::WrittenHighlight), 0);

    logger.get_mut(1).unwrap().set_highlight(true);
    logger.highlight(Some(0), false);
    let backend = logger.heatmap_backend().unwrap();
    assert_eq!(backend.coverage(HeatmapTarget::WrittenHighlight, 10, 20), Some(1.0));
    assert_eq!(backend.coverage(HeatmapTarget::WrittenHighlight, 200, 0), Some(1.0));
    assert_eq!(backend.coverage(HeatmapTarget::ReadHighlight, 101, 1), Some(1.0));

    logger.highlight(Some(0), true);
    let backend = logger.heatmap_backend().unwrap();
    assert_eq!(backend.coverage(HeatmapTarget::WrittenHighlight, 200, 0), Some(0.0));
    assert_eq!(backend.coverage(HeatmapTarget::ReadHighlight, 101, 1), Some(0.0));

    // a new frame starts with empty heatmaps
    logger.on_vsync(&mut host);
    add_fill(&mut logger, &mut host, FastFill::new(0, 512, 256, 16, 16));
    let backend = logger.heatmap_backend().unwrap();
    assert_eq!(backend.coverage(HeatmapTarget::WrittenHeatmap, 10, 20), Some(0.0));
    assert_eq!(backend.coverage(HeatmapTarget::WrittenHeatmap, 512, 256), Some(1.0));

    assert!(logger.disable().is_some());
    assert!(!logger.heatmaps_enabled());
    assert!(logger.vram_baseline().is_none());
}

#[test]
fn truncated_upload_replays_whole() {
    let mut logger = GpuLogger::new();
    let mut host = TestHost::default();

    // 64x64 upload, 2048 data words
    let mut upload = vec![0xA000_0000, 0x0000_0000, 0x0040_0040];
    upload.extend(std::iter::repeat(0x7FFF_7FFF).take(2048));
    logger.add_gp0(&mut host, &upload, Origin::DirectDma, 0x0010_0000, 4 * 2051);
    let fill = fill_words(0x00FF00, 0, 0, 16, 16);
    logger.add_gp0(&mut host, &fill, Origin::DataWrite, fill[0], 12);

    let logged = logger.get(0).unwrap();
    assert!(logged.words_truncated());
    assert_eq!(logged.words().len(), 1024);
    assert_eq!(logged.stats().pixel_writes, 64 * 64);

    let mut recorder = ReplayRecorder::default();
    logger.replay(&mut recorder);

    // baseline + upload + fill + vblank
    assert_eq!(recorder.events.len(), 1 + upload.len() + fill.len() + 1);
    let gp0 = recorder
        .events
        .iter()
        .filter_map(|event| match event {
            ReplayEvent::Gp0(word) => Some(*word),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(&gp0[..upload.len()], &upload[..]);
    assert_eq!(&gp0[upload.len()..], &fill[..]);
    assert_eq!(recorder.events.last(), Some(&ReplayEvent::Vblank(true)));
}
