//! Selectable foreground colour for the menu and conversations.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crossterm::queue;
use crossterm::style::{Color, ResetColor, SetForegroundColor};

/// Terminal text colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextColor {
    /// The terminal's own foreground colour.
    #[default]
    DefaultWhite,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

/// Unknown colour name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown colour {0:?}")]
pub struct UnknownColor(pub String);

impl TextColor {
    /// Every colour, in menu order.
    pub const ALL: [Self; 8] = [
        Self::DefaultWhite,
        Self::Blue,
        Self::Green,
        Self::Cyan,
        Self::Red,
        Self::Magenta,
        Self::Yellow,
        Self::White,
    ];

    /// Colour for a 1-based menu choice.
    #[must_use]
    pub fn from_choice(choice: usize) -> Option<Self> {
        choice
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    const fn name(self) -> &'static str {
        match self {
            Self::DefaultWhite => "default",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Cyan => "cyan",
            Self::Red => "red",
            Self::Magenta => "magenta",
            Self::Yellow => "yellow",
            Self::White => "white",
        }
    }

    const fn to_crossterm(self) -> Color {
        match self {
            Self::DefaultWhite => Color::Reset,
            Self::Blue => Color::Blue,
            Self::Green => Color::Green,
            Self::Cyan => Color::Cyan,
            Self::Red => Color::Red,
            Self::Magenta => Color::Magenta,
            Self::Yellow => Color::Yellow,
            Self::White => Color::White,
        }
    }

    /// Queues the colour change on `w`. The caller flushes.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the writer.
    pub fn apply<W: Write>(self, w: &mut W) -> io::Result<()> {
        queue!(w, SetForegroundColor(self.to_crossterm()))
    }
}

/// Queues a reset to the terminal's default colours.
///
/// # Errors
///
/// Returns any I/O error from the writer.
pub fn reset<W: Write>(w: &mut W) -> io::Result<()> {
    queue!(w, ResetColor)
}

impl fmt::Display for TextColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|color| color.name() == wanted)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}
