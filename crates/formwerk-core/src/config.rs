// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fill configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FormwerkError, Result};

/// How widget visuals are baked into page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlattenStrategy {
    /// Replay each widget's resolved appearance stream onto the page.
    #[default]
    AppearanceReplay,
    /// Ignore appearance streams; draw text and checkmarks directly.
    DirectDraw,
}

/// Settings for a fill-and-flatten run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Flattening strategy.
    pub strategy: FlattenStrategy,
    /// Starting font size for auto-fit text, in points.
    pub base_font_size: f32,
    /// Auto-fit never shrinks text below this size.
    pub min_font_size: f32,
    /// Horizontal padding on each side of a text field, in points.
    pub text_padding: f32,
    /// TrueType font embedded for drawn text, replacing the bundled
    /// DejaVu Sans.
    pub font_file: Option<PathBuf>,
    /// Compress content streams before writing.
    pub compress_output: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            strategy: FlattenStrategy::AppearanceReplay,
            base_font_size: 12.0,
            min_font_size: 6.0,
            text_padding: 2.0,
            font_file: None,
            compress_output: true,
        }
    }
}

impl FillConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: FillConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the renderer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_font_size > 0.0) {
            return Err(FormwerkError::Config(format!(
                "min_font_size must be positive, got {}",
                self.min_font_size
            )));
        }
        if self.min_font_size > self.base_font_size {
            return Err(FormwerkError::Config(format!(
                "min_font_size {} exceeds base_font_size {}",
                self.min_font_size, self.base_font_size
            )));
        }
        if !(self.text_padding >= 0.0) {
            return Err(FormwerkError::Config(format!(
                "text_padding must not be negative, got {}",
                self.text_padding
            )));
        }
        Ok(())
    }
}
