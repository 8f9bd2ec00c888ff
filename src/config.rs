use crate::color::ChannelDepth;

/// Build-time knobs of a [`crate::controller::VgaController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How the palette of glyph map colors is resolved
    pub channel_depth: ChannelDepth,
    /// Primitives the queue holds before producers block
    pub queue_capacity: usize,
    /// Most separate allocations the viewport may be spread over
    pub memory_pool_count: usize,
    /// Queue primitives for the retrace instead of drawing them right away
    pub background_execution: bool,
    /// Stop draining the queue once the retrace budget is spent
    pub background_timeout: bool,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            channel_depth: ChannelDepth::Two,
            queue_capacity: 1024,
            memory_pool_count: 10,
            background_execution: true,
            background_timeout: true,
        }
    }
}

impl ControllerConfig {
    pub const fn with_channel_depth(self, channel_depth: ChannelDepth) -> ControllerConfig {
        ControllerConfig {
            channel_depth,
            ..self
        }
    }

    pub const fn with_queue_capacity(self, queue_capacity: usize) -> ControllerConfig {
        ControllerConfig {
            queue_capacity,
            ..self
        }
    }

    pub const fn with_memory_pool_count(self, memory_pool_count: usize) -> ControllerConfig {
        ControllerConfig {
            memory_pool_count,
            ..self
        }
    }

    pub const fn with_background_execution(self, background_execution: bool) -> ControllerConfig {
        ControllerConfig {
            background_execution,
            ..self
        }
    }

    pub const fn with_background_timeout(self, background_timeout: bool) -> ControllerConfig {
        ControllerConfig {
            background_timeout,
            ..self
        }
    }
}
