use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankDir {
    #[default]
    #[serde(rename = "TB")]
    TopBottom,
    #[serde(rename = "BT")]
    BottomTop,
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "RL")]
    RightLeft,
}

impl RankDir {
    pub fn as_dagre(self) -> &'static str {
        match self {
            Self::TopBottom => "tb",
            Self::BottomTop => "bt",
            Self::LeftRight => "lr",
            Self::RightLeft => "rl",
        }
    }
}

/// Tunables for the A* edge router. Pixel output is not normative; only the
/// topological guarantees (obstacle avoidance, straight fallback) are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub enabled: bool,
    pub cell_size: f32,
    pub clearance: f32,
    /// Free cells added around the search region so paths can go around
    /// obstacles that touch its border.
    pub padding_cells: usize,
    pub max_steps: usize,
    pub max_cells: usize,
    /// Extra cost per direction change, in cells.
    pub turn_penalty: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cell_size: 8.0,
            clearance: 4.0,
            padding_cells: 2,
            max_steps: 50_000,
            max_cells: 250_000,
            turn_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub rankdir: RankDir,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub margin_x: f32,
    pub margin_y: f32,
    pub default_node_width: f32,
    pub default_node_height: f32,
    /// Space between a group's border and the boxes of its members.
    pub group_padding: f32,
    pub router: RouterConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rankdir: RankDir::TopBottom,
            node_spacing: 50.0,
            rank_spacing: 50.0,
            margin_x: 8.0,
            margin_y: 8.0,
            default_node_width: 80.0,
            default_node_height: 40.0,
            group_padding: 24.0,
            router: RouterConfig::default(),
        }
    }
}

/// Zoom thresholds (pixels per micro cell) for the grid-line overlay. Lines
/// start fading in at `*_fade_in` and are fully opaque from `*_full` up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLineConfig {
    pub logical_fade_in: f32,
    pub logical_full: f32,
    pub micro_fade_in: f32,
    pub micro_full: f32,
    pub line_width: f32,
    pub logical_color: String,
    pub micro_color: String,
}

impl Default for GridLineConfig {
    fn default() -> Self {
        Self {
            logical_fade_in: 2.0,
            logical_full: 4.0,
            micro_fade_in: 8.0,
            micro_full: 16.0,
            line_width: 1.0,
            logical_color: "#333333".to_string(),
            micro_color: "#9AA4B2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub background: String,
    pub grid: GridLineConfig,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            background: "#FFFFFF".to_string(),
            grid: GridLineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub background: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            padding: 16.0,
            background: "#FFFFFF".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub matrix: MatrixConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        let theme = Theme::modern();
        let render = RenderConfig {
            background: theme.background.clone(),
            ..Default::default()
        };
        Self {
            theme,
            layout: LayoutConfig::default(),
            matrix: MatrixConfig::default(),
            render,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterConfigFile {
    enabled: Option<bool>,
    cell_size: Option<f32>,
    clearance: Option<f32>,
    padding_cells: Option<usize>,
    max_steps: Option<usize>,
    max_cells: Option<usize>,
    turn_penalty: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    rankdir: Option<RankDir>,
    nodesep: Option<f32>,
    ranksep: Option<f32>,
    marginx: Option<f32>,
    marginy: Option<f32>,
    default_node_width: Option<f32>,
    default_node_height: Option<f32>,
    group_padding: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridLineConfigFile {
    logical_fade_in: Option<f32>,
    logical_full: Option<f32>,
    micro_fade_in: Option<f32>,
    micro_full: Option<f32>,
    line_width: Option<f32>,
    logical_color: Option<String>,
    micro_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatrixConfigFile {
    background: Option<String>,
    grid: Option<GridLineConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    layout: Option<LayoutConfigFile>,
    router: Option<RouterConfigFile>,
    matrix: Option<MatrixConfigFile>,
    width: Option<f32>,
    height: Option<f32>,
}

/// Loads a JSON5 config file on top of the defaults. `None` yields defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown theme '{name}'"))?;
        config.render.background = config.theme.background.clone();
    }
    if let Some(v) = parsed.font_family {
        config.theme.font_family = v;
    }
    if let Some(v) = parsed.font_size {
        config.theme.font_size = v;
    }
    if let Some(v) = parsed.width {
        config.render.width = v;
    }
    if let Some(v) = parsed.height {
        config.render.height = v;
    }

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.rankdir {
            target.rankdir = v;
        }
        if let Some(v) = layout.nodesep {
            target.node_spacing = v;
        }
        if let Some(v) = layout.ranksep {
            target.rank_spacing = v;
        }
        if let Some(v) = layout.marginx {
            target.margin_x = v;
        }
        if let Some(v) = layout.marginy {
            target.margin_y = v;
        }
        if let Some(v) = layout.default_node_width {
            target.default_node_width = v;
        }
        if let Some(v) = layout.default_node_height {
            target.default_node_height = v;
        }
        if let Some(v) = layout.group_padding {
            target.group_padding = v;
        }
    }

    if let Some(router) = parsed.router {
        let target = &mut config.layout.router;
        if let Some(v) = router.enabled {
            target.enabled = v;
        }
        if let Some(v) = router.cell_size {
            target.cell_size = v;
        }
        if let Some(v) = router.clearance {
            target.clearance = v;
        }
        if let Some(v) = router.padding_cells {
            target.padding_cells = v;
        }
        if let Some(v) = router.max_steps {
            target.max_steps = v;
        }
        if let Some(v) = router.max_cells {
            target.max_cells = v;
        }
        if let Some(v) = router.turn_penalty {
            target.turn_penalty = v;
        }
    }

    if let Some(matrix) = parsed.matrix {
        if let Some(v) = matrix.background {
            config.matrix.background = v;
        }
        if let Some(grid) = matrix.grid {
            let target = &mut config.matrix.grid;
            if let Some(v) = grid.logical_fade_in {
                target.logical_fade_in = v;
            }
            if let Some(v) = grid.logical_full {
                target.logical_full = v;
            }
            if let Some(v) = grid.micro_fade_in {
                target.micro_fade_in = v;
            }
            if let Some(v) = grid.micro_full {
                target.micro_full = v;
            }
            if let Some(v) = grid.line_width {
                target.line_width = v;
            }
            if let Some(v) = grid.logical_color {
                target.logical_color = v;
            }
            if let Some(v) = grid.micro_color {
                target.micro_color = v;
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json5_overrides_defaults() {
        let config = parse_config(
            r#"{
                // comments are allowed
                theme: "classic",
                layout: { rankdir: "LR", nodesep: 20 },
                router: { enabled: true, cellSize: 4 },
                matrix: { grid: { microFull: 32 } },
            }"#,
        )
        .unwrap();
        assert_eq!(config.layout.rankdir, RankDir::LeftRight);
        assert_eq!(config.layout.node_spacing, 20.0);
        assert_eq!(config.layout.rank_spacing, 50.0);
        assert!(config.layout.router.enabled);
        assert_eq!(config.layout.router.cell_size, 4.0);
        assert_eq!(config.matrix.grid.micro_full, 32.0);
        assert_eq!(config.theme.font_size, Theme::classic().font_size);
    }

    #[test]
    fn rank_direction_uses_engine_spelling() {
        let names: Vec<&str> = [RankDir::TopBottom, RankDir::BottomTop, RankDir::LeftRight, RankDir::RightLeft]
            .into_iter()
            .map(RankDir::as_dagre)
            .collect();
        assert_eq!(names, ["tb", "bt", "lr", "rl"]);
    }

    #[test]
    fn unknown_theme_is_rejected() {
        assert!(parse_config(r#"{ theme: "neon" }"#).is_err());
    }
}
