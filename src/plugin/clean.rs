use super::{HookStage, InitContext, Plugin, PluginError};

/// Requests that the output directory be emptied before the build is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanPlugin;

impl Plugin for CleanPlugin {
    fn name(&self) -> &str {
        "clean"
    }

    fn stages(&self) -> &[HookStage] {
        &[HookStage::Init]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), PluginError> {
        ctx.request_clean();
        Ok(())
    }
}
