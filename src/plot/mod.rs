//! Terminal rendering.
//!
//! Whether plots can be drawn is decided once, up front, into a
//! [`PlotCapability`]. Call sites hold a [`Renderer`] and never check the terminal again.

pub mod ascii;

pub use ascii::{PlotInput, render_plot};

pub const DEFAULT_WIDTH: usize = 72;
pub const DEFAULT_HEIGHT: usize = 18;

/// Resolved plotting capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotCapability {
    Terminal { width: usize, height: usize },
    Disabled { reason: String },
}

impl PlotCapability {
    /// Decide from user flags and the requested size.
    pub fn resolve(disabled: bool, width: usize, height: usize) -> Self {
        if disabled {
            return PlotCapability::Disabled {
                reason: "plotting disabled by --no-plot".to_string(),
            };
        }
        if width == 0 || height == 0 {
            return PlotCapability::Disabled {
                reason: format!("plot size {width}x{height} is empty"),
            };
        }
        PlotCapability::Terminal { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderer {
    Available { width: usize, height: usize },
    Unavailable { reason: String },
}

impl Renderer {
    pub fn new(capability: PlotCapability) -> Self {
        match capability {
            PlotCapability::Terminal { width, height } => Renderer::Available { width, height },
            PlotCapability::Disabled { reason } => {
                log::debug!("plots unavailable: {reason}");
                Renderer::Unavailable { reason }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Renderer::Available { .. })
    }

    /// Render, or `None` when plotting is unavailable.
    pub fn render(&self, input: &PlotInput<'_>) -> Option<String> {
        match self {
            Renderer::Available { width, height } => Some(render_plot(input, *width, *height)),
            Renderer::Unavailable { .. } => None,
        }
    }
}
