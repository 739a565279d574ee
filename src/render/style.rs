//! Immutable render style and its presets.

use egui::Color32;

/// Colours and stroke settings handed to the renderer by reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Style {
    pub name: &'static str,
    pub background: Color32,
    pub grid: Color32,
    pub text: Color32,
    /// Colour of inline diagnostics painted in place of a failed group.
    pub diagnostic: Color32,
    /// Trace colours, assigned round-robin by position within a group.
    pub palette: Vec<Color32>,
    pub line_width: f32,
}

impl Default for Style {
    fn default() -> Self {
        Style::dark()
    }
}

impl Style {
    pub fn dark() -> Self {
        Self {
            name: "dark",
            background: Color32::from_rgb(27, 27, 27),
            grid: Color32::from_rgb(60, 60, 60),
            text: Color32::from_rgb(210, 210, 210),
            diagnostic: Color32::from_rgb(255, 96, 96),
            palette: vec![
                Color32::from_rgb(31, 119, 180),
                Color32::from_rgb(255, 127, 14),
                Color32::from_rgb(44, 160, 44),
                Color32::from_rgb(214, 39, 40),
                Color32::from_rgb(148, 103, 189),
                Color32::from_rgb(140, 86, 75),
                Color32::from_rgb(227, 119, 194),
                Color32::from_rgb(127, 127, 127),
            ],
            line_width: 1.5,
        }
    }

    pub fn light() -> Self {
        Self {
            name: "light",
            background: Color32::from_rgb(248, 248, 248),
            grid: Color32::from_rgb(210, 210, 210),
            text: Color32::from_rgb(40, 40, 40),
            diagnostic: Color32::from_rgb(200, 0, 0),
            palette: vec![
                Color32::from_rgb(228, 26, 28),
                Color32::from_rgb(55, 126, 184),
                Color32::from_rgb(77, 175, 74),
                Color32::from_rgb(152, 78, 163),
                Color32::from_rgb(255, 127, 0),
                Color32::from_rgb(166, 86, 40),
                Color32::from_rgb(247, 129, 191),
                Color32::from_rgb(153, 153, 153),
            ],
            line_width: 1.5,
        }
    }

    /// Pure black background, saturated traces, thicker lines.
    pub fn high_contrast() -> Self {
        Self {
            name: "high_contrast",
            background: Color32::BLACK,
            grid: Color32::from_rgb(90, 90, 90),
            text: Color32::WHITE,
            diagnostic: Color32::from_rgb(255, 255, 0),
            palette: vec![
                Color32::from_rgb(0, 255, 255),
                Color32::from_rgb(255, 255, 0),
                Color32::from_rgb(0, 255, 0),
                Color32::from_rgb(255, 0, 255),
                Color32::from_rgb(255, 128, 0),
                Color32::WHITE,
            ],
            line_width: 2.5,
        }
    }

    /// Preset by name; unknown names fall back to [`Style::dark`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "light" => Style::light(),
            "high_contrast" => Style::high_contrast(),
            "dark" => Style::dark(),
            other => {
                log::warn!("unknown style preset '{other}', using dark");
                Style::dark()
            }
        }
    }

    /// Colour of the `index`-th trace of a group.
    pub fn trace_color(&self, index: usize) -> Color32 {
        if self.palette.is_empty() {
            return self.text;
        }
        self.palette[index % self.palette.len()]
    }
}
