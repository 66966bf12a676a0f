use crate::gpu::{GpuCommand, Logged};
use crate::vram::Vram;

/// The parts of the emulator the logger needs while capturing.
///
/// The logger is driven from the emulation thread, so these are plain `&mut self`
/// calls, no synchronization is involved.
pub trait EmulatorHost {
    /// The CPU program counter at the time of the call, stamped on each logged command.
    fn program_counter(&self) -> u32;

    /// Called on vsync when the logger is set to break on every frame.
    fn pause(&mut self) {}

    /// Take a copy of the current VRAM, used as the baseline of a new frame.
    ///
    /// `None` if the GPU can't provide it, replay will then skip restoring memory.
    fn acquire_vram(&mut self) -> Option<Vram>;
}

/// A GPU implementation that logged commands can be replayed into.
pub trait ReplayTarget {
    /// Overwrite a block of VRAM, the block is `w*h` texels in row order.
    fn partial_update_vram(&mut self, x: u32, y: u32, w: u32, h: u32, block: &[u16]);

    fn write_gp0(&mut self, data: u32);
    fn write_gp1(&mut self, data: u32);

    /// Signal the end of a frame. `from_replay` is `true` when issued by the logger.
    fn vblank(&mut self, from_replay: bool);

    /// Re-issue one logged command.
    ///
    /// By default, control commands are written back to GP1 and everything else
    /// is streamed word by word to GP0. Truncated VRAM uploads are sent whole, see
    /// [`Logged::replay_words`].
    fn execute(&mut self, logged: &Logged) {
        if logged.words_truncated() && !matches!(logged.command, GpuCommand::BlitRamVram(_)) {
            log::warn!(
                "replaying truncated {} (frame {}), the GPU will see an incomplete command",
                logged.command.name(),
                logged.frame()
            );
        }

        if logged.command.is_control() {
            for &word in logged.words() {
                self.write_gp1(word);
            }
        } else {
            for &word in logged.replay_words().iter() {
                self.write_gp0(word);
            }
        }
    }
}
