//! Sorter context
//!
//! Immutable settings for one pipeline instance: where the stores live and
//! which heuristics, locator and encoder settings apply. Built once at
//! startup and handed to every component.

use crate::error::SortResult;
use crate::models::SortParameters;
use crate::services::qr_locator::LocatorSettings;
use crate::services::video_renderer::RenderSettings;
use shelfcam_common::config::TomlConfig;
use shelfcam_common::StoreLayout;
use std::path::PathBuf;

/// Command-line values that override the TOML configuration
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub robot_number: Option<String>,
    pub boxes_per_shelf: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SortContext {
    pub layout: StoreLayout,
    pub params: SortParameters,
    pub render: RenderSettings,
    pub locator: LocatorSettings,
}

impl SortContext {
    /// Context with built-in defaults for `robot_number` and `boxes_per_shelf`
    pub fn init(
        install_root: impl Into<PathBuf>,
        robot_number: Option<&str>,
        boxes_per_shelf: u32,
    ) -> SortResult<Self> {
        let params = SortParameters {
            boxes_per_shelf,
            ..Default::default()
        };
        params.validate()?;

        Ok(Self {
            layout: StoreLayout::new(install_root, robot_number),
            params,
            render: RenderSettings::default(),
            locator: LocatorSettings::default(),
        })
    }

    /// Context from a loaded configuration file plus command-line overrides
    pub fn from_config(
        install_root: impl Into<PathBuf>,
        config: &TomlConfig,
        overrides: &ContextOverrides,
    ) -> SortResult<Self> {
        let mut params = SortParameters::from_config(&config.sorting)?;
        if let Some(boxes) = overrides.boxes_per_shelf {
            params.boxes_per_shelf = boxes;
            params.validate()?;
        }

        let robot_number = overrides
            .robot_number
            .as_deref()
            .or(config.robot_number.as_deref());

        Ok(Self {
            layout: StoreLayout::new(install_root, robot_number),
            params,
            render: RenderSettings::from_config(&config.render),
            locator: LocatorSettings::from_config(&config.locator)?,
        })
    }
}
