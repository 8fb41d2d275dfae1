//! Info screen for the current effect.

use core::fmt::Write;

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use heapless::{String, Vec};
use screensaver_common::colors::{HINT, INFO_BG, INFO_CATEGORY, INFO_TEXT, YELLOW, to_565};

use super::{body_text, truncate};
use crate::registry::EffectDescriptor;

// =============================================================================
// Layout Constants
// =============================================================================

const INFO_X: i32 = 2;
const TITLE_Y: i32 = 2;
const CATEGORY_Y: i32 = 18;
const DESCRIPTION_Y: i32 = 34;
const LINE_STEP: i32 = 12;
const PAUSED_Y: i32 = 86;
const HINT_Y: i32 = 110;

/// Characters of the name shown after the `#n: ` prefix.
const NAME_CHARS: usize = 12;

/// Wrap width of the description, in characters.
pub const DESCRIPTION_WIDTH: usize = 15;

/// Description lines that fit above the paused marker.
pub const DESCRIPTION_LINES: usize = 4;

const LINE_CAPACITY: usize = 32;

const PAUSED_COLOR: Rgb888 = Rgb888::new(255, 160, 0);

/// Wrapped description lines.
pub type InfoLines = Vec<String<LINE_CAPACITY>, DESCRIPTION_LINES>;

/// Push as much of `text` as fits.
fn push_clipped(
    line: &mut String<LINE_CAPACITY>,
    text: &str,
) {
    for c in text.chars() {
        if line.push(c).is_err() {
            break;
        }
    }
}

/// Greedy word wrap at `width` characters, keeping the first
/// [`DESCRIPTION_LINES`] lines. A word longer than `width` gets its own line.
pub fn wrap_words(
    text: &str,
    width: usize,
) -> InfoLines {
    let mut lines = InfoLines::new();
    let mut current: String<LINE_CAPACITY> = String::new();

    for word in text.split_whitespace() {
        let fits = current.chars().count() + 1 + word.chars().count() <= width;
        if current.is_empty() {
            push_clipped(&mut current, word);
        } else if fits {
            push_clipped(&mut current, " ");
            push_clipped(&mut current, word);
        } else {
            if lines.push(core::mem::take(&mut current)).is_err() {
                return lines;
            }
            push_clipped(&mut current, word);
        }
    }
    if !current.is_empty() {
        let _ = lines.push(current);
    }
    lines
}

/// Name, category and description of the effect at playlist `position`
/// (1-based).
pub fn draw_info<D>(
    target: &mut D,
    position: usize,
    descriptor: &EffectDescriptor,
    paused: bool,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(to_565(INFO_BG))?;

    let mut title: String<24> = String::new();
    let _ = write!(title, "#{position}: {}", truncate(descriptor.name, NAME_CHARS));
    body_text(target, &title, INFO_X, TITLE_Y, YELLOW)?;

    let mut category: String<LINE_CAPACITY> = String::new();
    let _ = write!(category, "Cat: {}", descriptor.category);
    body_text(target, &category, INFO_X, CATEGORY_Y, to_565(INFO_CATEGORY))?;

    let mut y = DESCRIPTION_Y;
    for line in wrap_words(descriptor.description, DESCRIPTION_WIDTH) {
        body_text(target, &line, INFO_X, y, to_565(INFO_TEXT))?;
        y += LINE_STEP;
    }

    if paused {
        body_text(target, "PAUSED", INFO_X, PAUSED_Y, to_565(PAUSED_COLOR))?;
    }

    body_text(target, "KEY1> KEY2< KEY3||", INFO_X, HINT_Y, to_565(HINT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EffectRegistry;
    use crate::st7735::Framebuffer;

    fn lines(text: &str) -> std::vec::Vec<std::string::String> {
        wrap_words(text, DESCRIPTION_WIDTH).iter().map(|l| l.as_str().to_string()).collect()
    }

    #[test]
    fn test_wrap_respects_width() {
        assert_eq!(lines("Green katakana style glyphs falling"), vec![
            "Green katakana",
            "style glyphs",
            "falling"
        ]);
    }

    #[test]
    fn test_wrap_keeps_four_lines() {
        let wrapped = lines("one two three four five six seven eight nine ten eleven twelve thirteen");
        assert_eq!(wrapped.len(), DESCRIPTION_LINES);
        assert_eq!(wrapped[0], "one two three");
    }

    #[test]
    fn test_long_word_gets_own_line() {
        assert_eq!(lines("a supercalifragilistic b"), vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_wrap_empty() {
        assert!(lines("   ").is_empty());
    }

    #[test]
    fn test_info_screen_paused_marker() {
        let registry = EffectRegistry::builtin();
        let descriptor = registry.by_id(19).unwrap();
        let paused_color = to_565(PAUSED_COLOR);
        let has_marker = |frame: &Framebuffer| {
            (86..96).any(|y| (0..128).any(|x| frame.pixel(x, y) == Some(paused_color)))
        };

        let mut frame = Framebuffer::new();
        draw_info(&mut frame, 19, descriptor, false).unwrap();
        assert_eq!(frame.pixel(127, 0), Some(to_565(INFO_BG)));
        assert!(!has_marker(&frame));

        draw_info(&mut frame, 19, descriptor, true).unwrap();
        assert!(has_marker(&frame));
        assert!((2..12).any(|y| (0..128).any(|x| frame.pixel(x, y) == Some(YELLOW))));
    }
}
