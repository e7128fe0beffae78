use std::{collections::HashMap, fs, path::Path};

use crate::{RenderError, backend::Color};

/// Render settings shared by every output.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Milliseconds reserved for rendering a frame; `-1` disables the repaint delay.
    pub max_render_time: i32,
    /// Let the repaint delay adapt to missed frames instead of pinning it.
    pub dynamic_delay: bool,
    /// Repaint the whole output every frame.
    pub disable_damage_tracking: bool,
    pub scanout: bool,
    pub background_color: Color,
    pub workspace_grid: (i32, i32),
}

// Background clear color
const DEFAULT_BACKGROUND: [f32; 4] = [150.0 / 255.0, 154.0 / 255.0, 171.0 / 255.0, 1.0];

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_render_time: -1,
            dynamic_delay: true,
            disable_damage_tracking: false,
            scanout: true,
            background_color: Color::from(DEFAULT_BACKGROUND),
            workspace_grid: (3, 3),
        }
    }
}

impl RenderConfig {
    /// Defaults, then environment overrides.
    pub fn from_env() -> Result<Self, RenderError> {
        let mut config = Self::default();
        config.apply_environment()?;
        Ok(config)
    }

    pub fn apply_environment(&mut self) -> Result<(), RenderError> {
        if let Some(disabled) = env_truthy("RENDER_DISABLE_SCANOUT") {
            self.scanout = !disabled;
        }
        if let Some(full) = env_truthy("RENDER_FORCE_FULL_REDRAW") {
            self.disable_damage_tracking = full;
        }
        if let Ok(raw) = std::env::var("RENDER_MAX_RENDER_TIME") {
            self.max_render_time = parse_max_render_time(&raw, "RENDER_MAX_RENDER_TIME")?;
        }
        Ok(())
    }
}

fn env_truthy(name: &str) -> Option<bool> {
    std::env::var_os(name).map(|value| {
        let value = value.to_string_lossy().to_ascii_lowercase();
        matches!(value.as_str(), "1" | "true" | "yes" | "on")
    })
}

/// Read `key = value` lines; `#` starts a comment.
pub fn load_from_path(path: &Path) -> Result<RenderConfig, RenderError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        RenderError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;
    let values = parse_key_values(&raw)?;
    from_values(&values)
}

pub fn from_values(values: &HashMap<String, String>) -> Result<RenderConfig, RenderError> {
    let defaults = RenderConfig::default();
    let max_render_time = match values.get("max_render_time") {
        Some(raw) => parse_max_render_time(raw, "max_render_time")?,
        None => defaults.max_render_time,
    };
    let background_color = match values.get("background_color") {
        Some(raw) => parse_color(raw, "background_color")?,
        None => defaults.background_color,
    };
    let workspace_grid = (
        parse_grid_dimension(values, "workspace_columns", defaults.workspace_grid.0)?,
        parse_grid_dimension(values, "workspace_rows", defaults.workspace_grid.1)?,
    );

    Ok(RenderConfig {
        max_render_time,
        dynamic_delay: parse_bool_flexible(values, "dynamic_delay", defaults.dynamic_delay)?,
        disable_damage_tracking: parse_bool_flexible(
            values,
            "disable_damage_tracking",
            defaults.disable_damage_tracking,
        )?,
        scanout: parse_bool_flexible(values, "scanout", defaults.scanout)?,
        background_color,
        workspace_grid,
    })
}

fn parse_key_values(raw: &str) -> Result<HashMap<String, String>, RenderError> {
    let mut values = HashMap::new();
    for (index, line) in raw.lines().enumerate() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(RenderError::Config(format!(
                "line {}: expected `key = value`, got `{line}`",
                index + 1
            )));
        };
        values.insert(key.trim().to_owned(), value.trim().trim_matches('"').to_owned());
    }
    Ok(values)
}

/// Cut a `#` comment that starts the line or follows whitespace outside quotes.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut previous = ' ';
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes && previous.is_whitespace() => return &line[..index],
            _ => {}
        }
        previous = ch;
    }
    line
}

fn parse_max_render_time(raw: &str, key: &str) -> Result<i32, RenderError> {
    let value = raw.trim().parse::<i32>().map_err(|err| {
        RenderError::Config(format!("invalid value for {key}: {raw} ({err})"))
    })?;
    if value < -1 {
        return Err(RenderError::Config(format!(
            "invalid value for {key}: {raw} (expected -1 or a non-negative number)"
        )));
    }
    Ok(value)
}

fn parse_grid_dimension(
    values: &HashMap<String, String>,
    key: &str,
    default: i32,
) -> Result<i32, RenderError> {
    match values.get(key) {
        Some(raw) => match raw.trim().parse::<i32>() {
            Ok(value) if value >= 1 => Ok(value),
            Ok(_) => Err(RenderError::Config(format!(
                "invalid value for {key}: {raw} (must be at least 1)"
            ))),
            Err(err) => Err(RenderError::Config(format!(
                "invalid value for {key}: {raw} ({err})"
            ))),
        },
        None => Ok(default),
    }
}

fn parse_bool_flexible(
    values: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, RenderError> {
    let Some(raw) = values.get(key) else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(RenderError::Config(format!(
            "invalid value for {key}: {raw} (expected bool or 0/1)"
        ))),
    }
}

/// `#rrggbb` or `#rrggbbaa`.
fn parse_color(raw: &str, key: &str) -> Result<Color, RenderError> {
    let invalid = || RenderError::Config(format!("invalid value for {key}: {raw} (expected #rrggbb[aa])"));
    let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 && hex.len() != 8 {
        return Err(invalid());
    }
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .map(|value| value as f32 / 255.0)
            .ok_or_else(invalid)
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 1.0 };
    Ok(Color::new(channel(0)?, channel(2)?, channel(4)?, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &str) -> HashMap<String, String> {
        parse_key_values(raw).unwrap()
    }

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(from_values(&values("")).unwrap(), RenderConfig::default());
    }

    #[test]
    fn parses_all_keys() {
        let config = from_values(&values(
            "# render settings\n\
             max_render_time = 6\n\
             dynamic_delay = off\n\
             disable_damage_tracking = yes\n\
             scanout = 0\n\
             background_color = \"#ff000080\"\n\
             workspace_columns = 4\n\
             workspace_rows = 2 # trailing comment\n",
        ))
        .unwrap();

        assert_eq!(config.max_render_time, 6);
        assert!(!config.dynamic_delay);
        assert!(config.disable_damage_tracking);
        assert!(!config.scanout);
        assert_eq!(config.background_color.r, 1.0);
        assert!((config.background_color.a - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(config.workspace_grid, (4, 2));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(from_values(&values("max_render_time = -2")).is_err());
        assert!(from_values(&values("dynamic_delay = maybe")).is_err());
        assert!(from_values(&values("workspace_rows = 0")).is_err());
        assert!(from_values(&values("background_color = red")).is_err());
        assert!(parse_key_values("no equals sign").is_err());
    }
}
