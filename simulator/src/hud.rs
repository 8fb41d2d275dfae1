//! On-screen overlay for the preview: effect name, speed and frame rate.

use core::fmt::Write;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::Text;
use heapless::String;
use screensaver_common::styles::TOP_LEFT;
use screensaver_common::{BLACK, EffectKind, SCREEN_WIDTH, SpeedLevel, YELLOW};

// =============================================================================
// Layout
// =============================================================================

const BAR_HEIGHT: u32 = 22;
const LINE_1: Point = Point::new(2, 1);
const LINE_2: Point = Point::new(2, 11);

const BAR_STYLE: PrimitiveStyle<Rgb565> = PrimitiveStyle::with_fill(BLACK);
const TEXT_STYLE: MonoTextStyle<'static, Rgb565> = MonoTextStyle::new(&FONT_6X10, YELLOW);

/// What the overlay shows for the current frame.
#[derive(Clone, Copy, Debug)]
pub struct HudInfo {
    pub index: usize,
    pub kind: EffectKind,
    pub speed: SpeedLevel,
    pub fps: f32,
    pub paused: bool,
}

/// First line: `n/total key`, truncated to the panel width.
pub fn title_line(info: &HudInfo) -> String<24> {
    let mut line: String<64> = String::new();
    let _ = write!(line, "{}/{} {}", info.index + 1, EffectKind::ALL.len(), info.kind.key());
    let mut out = String::new();
    for c in line.chars().take(21) {
        let _ = out.push(c);
    }
    out
}

/// Second line: speed level and frame rate, or the pause marker.
pub fn status_line(info: &HudInfo) -> String<24> {
    let mut line = String::new();
    if info.paused {
        let _ = write!(line, "spd {} PAUSED", info.speed.level());
    } else {
        let _ = write!(line, "spd {} {:.1} fps", info.speed.level(), info.fps);
    }
    line
}

pub fn draw_hud<D>(
    display: &mut D,
    info: &HudInfo,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH, BAR_HEIGHT))
        .into_styled(BAR_STYLE)
        .draw(display)?;
    Text::with_text_style(&title_line(info), LINE_1, TEXT_STYLE, TOP_LEFT).draw(display)?;
    Text::with_text_style(&status_line(info), LINE_2, TEXT_STYLE, TOP_LEFT).draw(display)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(paused: bool) -> HudInfo {
        HudInfo {
            index: 8,
            kind: EffectKind::Raindrops,
            speed: SpeedLevel::NORMAL,
            fps: 19.96,
            paused,
        }
    }

    #[test]
    fn test_title_line() {
        assert_eq!(title_line(&info(false)).as_str(), "9/34 raindrops");
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(&info(false)).as_str(), "spd 6 20.0 fps");
        assert_eq!(status_line(&info(true)).as_str(), "spd 6 PAUSED");
    }
}
