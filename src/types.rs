/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub const fn a4() -> Self {
        Self::new(595.28, 841.89)
    }

    pub const fn letter() -> Self {
        Self::new(612.0, 792.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub const fn all(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rgb` or `#rrggbb`.
    pub fn from_hex(raw: &str) -> Option<Color> {
        let hex = raw.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            3 => {
                let mut out = [0.0f32; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let doubled: String = [ch, ch].iter().collect();
                    out[i] = channel(&doubled)?;
                }
                Some(Color::rgb(out[0], out[1], out[2]))
            }
            6 => Some(Color::rgb(
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
            )),
            _ => None,
        }
    }
}

/// Page layout handed to the renderer for every fragment of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    pub page_size: Size,
    pub margins: Margins,
    pub print_background: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            // The bottom margin keeps rendered content clear of the footer.
            margins: Margins::all(20.0),
            print_background: true,
        }
    }
}

impl LayoutOptions {
    pub fn content_width(&self) -> f32 {
        self.page_size.width - self.margins.left - self.margins.right
    }

    pub fn content_height(&self) -> f32 {
        self.page_size.height - self.margins.top - self.margins.bottom
    }
}
