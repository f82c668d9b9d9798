//! Node configuration.

use embedded_hal::can::{Id, StandardId};

use crate::{
    regs::OpMode,
    timing::{CanSpeed, McpSpeed},
};

/// How the receive buffers accept frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum Filtering {
    /// Each buffer only accepts frames matching its masks and filters.
    Enabled,
    /// Both buffers accept every frame, RXB0 rolling over into RXB1 when it
    /// is full.
    Disabled,
}

/// Settings used to initialize the MCP2515.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Mode entered once configuration is done.
    pub mode: OpMode,
    /// Device CAN speed.
    pub can_speed: CanSpeed,
    /// Device oscillator speed. Should match the clock speed of the oscillator
    /// attached to the MCP2515.
    pub mcp_speed: McpSpeed,
    /// Whether to enable the CLKOUT pin.
    pub clkout_en: bool,
    /// Hardware acceptance filtering.
    pub filtering: Filtering,
    /// Acceptance masks RXM0 and RXM1.
    pub masks: [Id; 2],
    /// Acceptance filters RXF0 to RXF5. RXF0/RXF1 belong to RXB0, the rest to
    /// RXB1.
    pub filters: [Id; 6],
}

const ZERO_ID: Id = Id::Standard(StandardId::ZERO);

/// Configuration this node is built with.
pub const NODE_SETTINGS: Settings = Settings {
    mode: OpMode::Normal,
    can_speed: CanSpeed::Kbps500,
    mcp_speed: McpSpeed::MHz16,
    clkout_en: false,
    filtering: Filtering::Disabled,
    masks: [ZERO_ID; 2],
    filters: [ZERO_ID; 6],
};

impl Default for Settings {
    fn default() -> Self {
        NODE_SETTINGS
    }
}

impl Settings {
    /// Replaces the bus speed.
    pub fn with_speed(mut self, can_speed: CanSpeed) -> Self {
        self.can_speed = can_speed;
        self
    }

    /// Enables acceptance filtering with the given masks and filters.
    pub fn with_filters(mut self, masks: [Id; 2], filters: [Id; 6]) -> Self {
        self.filtering = Filtering::Enabled;
        self.masks = masks;
        self.filters = filters;
        self
    }
}
