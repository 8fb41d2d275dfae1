//! ST7735S driver for the Waveshare 1.44" LCD HAT (128x128, RGB565).
//!
//! The driver is split into two parts:
//! - [`Framebuffer`]: implements `DrawTarget`, holds one frame in panel byte order
//! - [`St7735`]: owns the SPI device and control pins, pushes whole frames
//!
//! Effects draw the next frame into the framebuffer and call
//! [`DisplaySurface::present`], which sets the full-screen window once and
//! streams the buffer in spidev-sized chunks.

use std::fmt::Debug;

use anyhow::{Context, Result, anyhow};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use screensaver_common::config::{SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::display::{DisplaySurface, Orientation};

const WIDTH: usize = SCREEN_WIDTH as usize;
const HEIGHT: usize = SCREEN_HEIGHT as usize;

/// Bytes in one RGB565 frame (32,768).
pub const BUFFER_SIZE: usize = WIDTH * HEIGHT * 2;

/// Largest single write accepted by the spidev driver's default `bufsiz`.
const SPI_CHUNK: usize = 4096;

// ST7735 Commands
const SWRESET: u8 = 0x01;
const SLPOUT: u8 = 0x11;
const DISPON: u8 = 0x29;
const CASET: u8 = 0x2A;
const RASET: u8 = 0x2B;
const RAMWR: u8 = 0x2C;
const MADCTL: u8 = 0x36;
const COLMOD: u8 = 0x3A;

/// Panel tuning from the HAT vendor: frame rate, power, gamma.
const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (0xB1, &[0x01, 0x2C, 0x2D]),
    (0xB2, &[0x01, 0x2C, 0x2D]),
    (0xB3, &[0x01, 0x2C, 0x2D, 0x01, 0x2C, 0x2D]),
    (0xB4, &[0x07]),
    (0xC0, &[0xA2, 0x02, 0x84]),
    (0xC1, &[0xC5]),
    (0xC2, &[0x0A, 0x00]),
    (0xC3, &[0x8A, 0x2A]),
    (0xC4, &[0x8A, 0xEE]),
    (0xC5, &[0x0E]),
    (
        0xE0,
        &[
            0x0F, 0x1A, 0x0F, 0x18, 0x2F, 0x28, 0x20, 0x22, 0x1F, 0x1B, 0x23, 0x37, 0x00, 0x07, 0x02, 0x10,
        ],
    ),
    (
        0xE1,
        &[
            0x0F, 0x1B, 0x0F, 0x17, 0x33, 0x2C, 0x29, 0x2E, 0x30, 0x30, 0x39, 0x3F, 0x00, 0x07, 0x03, 0x10,
        ],
    ),
    (0xF0, &[0x01]),
    (0xF6, &[0x00]),
];

// =============================================================================
// Framebuffer
// =============================================================================

/// One frame in panel byte order (big-endian RGB565).
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    bytes: Box<[u8]>,
}

impl Framebuffer {
    /// A black frame.
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    /// Color at `(x, y)`, `None` outside the screen.
    pub fn pixel(
        &self,
        x: i32,
        y: i32,
    ) -> Option<Rgb565> {
        if x < 0 || y < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
            return None;
        }
        let idx = (y as usize * WIDTH + x as usize) * 2;
        let raw = u16::from_be_bytes([self.bytes[idx], self.bytes[idx + 1]]);
        Some(RawU16::new(raw).into())
    }

    /// Fill the whole buffer with one color.
    pub fn clear_buffer(
        &mut self,
        color: Rgb565,
    ) {
        let raw: RawU16 = color.into();
        let bytes = raw.into_inner().to_be_bytes();
        for pixel in self.bytes.chunks_exact_mut(2) {
            pixel.copy_from_slice(&bytes);
        }
    }

    #[inline]
    fn set_pixel(
        &mut self,
        x: i32,
        y: i32,
        color: Rgb565,
    ) {
        if x >= 0 && x < WIDTH as i32 && y >= 0 && y < HEIGHT as i32 {
            self.write_index(y as usize * WIDTH + x as usize, color);
        }
    }

    #[inline]
    fn write_index(
        &mut self,
        index: usize,
        color: Rgb565,
    ) {
        let raw: RawU16 = color.into();
        let bytes = raw.into_inner().to_be_bytes();
        self.bytes[index * 2] = bytes[0];
        self.bytes[index * 2 + 1] = bytes[1];
    }
}

impl Default for Framebuffer {
    fn default() -> Self { Self::new() }
}

impl Debug for Framebuffer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Framebuffer").field("len", &self.bytes.len()).finish()
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size { Size::new(SCREEN_WIDTH, SCREEN_HEIGHT) }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(
        &mut self,
        pixels: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_contiguous<I>(
        &mut self,
        area: &Rectangle,
        colors: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // Colors follow `area` row by row, including the clipped parts.
        let bounds = self.bounding_box();
        for (point, color) in area.points().zip(colors) {
            if bounds.contains(point) {
                self.write_index(point.y as usize * WIDTH + point.x as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        let drawable_area = area.intersection(&self.bounding_box());
        if drawable_area.size == Size::zero() {
            return Ok(());
        }

        let raw: RawU16 = color.into();
        let bytes = raw.into_inner().to_be_bytes();
        let x_start = drawable_area.top_left.x as usize;
        let width = drawable_area.size.width as usize;

        for y in drawable_area.rows() {
            let row_start = (y as usize * WIDTH + x_start) * 2;
            for pixel in self.bytes[row_start..row_start + width * 2].chunks_exact_mut(2) {
                pixel.copy_from_slice(&bytes);
            }
        }
        Ok(())
    }

    fn clear(
        &mut self,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        self.clear_buffer(color);
        Ok(())
    }
}

// =============================================================================
// Panel driver
// =============================================================================

/// ST7735S panel on an SPI bus with data/command, reset and backlight pins.
pub struct St7735<SPI, DC, RST, BL, D> {
    spi: SPI,
    dc: DC,
    rst: RST,
    backlight: BL,
    delay: D,
    /// Overrides the orientation's RAM offsets.
    offset_override: (Option<u16>, Option<u16>),
    offsets: (u16, u16),
}

impl<SPI, DC, RST, BL, D> St7735<SPI, DC, RST, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
    pub fn new(
        spi: SPI,
        dc: DC,
        rst: RST,
        backlight: BL,
        delay: D,
    ) -> Self {
        Self {
            spi,
            dc,
            rst,
            backlight,
            delay,
            offset_override: (None, None),
            offsets: Orientation::default().offsets(),
        }
    }

    /// Use fixed RAM offsets instead of the orientation's defaults.
    pub fn with_offsets(
        mut self,
        x: Option<u16>,
        y: Option<u16>,
    ) -> Self {
        self.offset_override = (x, y);
        self
    }

    /// Release the bus and pins.
    pub fn release(self) -> (SPI, DC, RST, BL) { (self.spi, self.dc, self.rst, self.backlight) }

    fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<()> {
        self.dc.set_low().map_err(|e| anyhow!("DC pin: {e:?}"))?;
        self.spi.write(&[cmd]).map_err(|e| anyhow!("SPI command {cmd:#04x}: {e:?}"))
    }

    fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<()> {
        self.dc.set_high().map_err(|e| anyhow!("DC pin: {e:?}"))?;
        for chunk in data.chunks(SPI_CHUNK) {
            self.spi.write(chunk).map_err(|e| anyhow!("SPI data: {e:?}"))?;
        }
        Ok(())
    }

    fn hardware_reset(&mut self) -> Result<()> {
        self.rst.set_high().map_err(|e| anyhow!("RST pin: {e:?}"))?;
        self.delay.delay_ms(100);
        self.rst.set_low().map_err(|e| anyhow!("RST pin: {e:?}"))?;
        self.delay.delay_ms(100);
        self.rst.set_high().map_err(|e| anyhow!("RST pin: {e:?}"))?;
        self.delay.delay_ms(100);
        Ok(())
    }

    /// Set the full-screen drawing window.
    fn set_window(&mut self) -> Result<()> {
        let (x_off, y_off) = self.offsets;
        let (x0, y0) = (x_off, y_off);
        let (x1, y1) = (x_off + WIDTH as u16 - 1, y_off + HEIGHT as u16 - 1);

        self.write_command(CASET)?;
        self.write_data(&[(x0 >> 8) as u8, x0 as u8, (x1 >> 8) as u8, x1 as u8])?;
        self.write_command(RASET)?;
        self.write_data(&[(y0 >> 8) as u8, y0 as u8, (y1 >> 8) as u8, y1 as u8])
    }
}

impl<SPI, DC, RST, BL, D> DisplaySurface for St7735<SPI, DC, RST, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
    fn initialize(
        &mut self,
        orientation: Orientation,
    ) -> Result<()> {
        let (x, y) = orientation.offsets();
        self.offsets = (self.offset_override.0.unwrap_or(x), self.offset_override.1.unwrap_or(y));

        self.backlight.set_high().map_err(|e| anyhow!("backlight pin: {e:?}"))?;
        self.hardware_reset()?;

        self.write_command(SWRESET)?;
        self.delay.delay_ms(150);

        for &(cmd, data) in INIT_SEQUENCE {
            self.write_command(cmd)?;
            self.write_data(data)?;
        }

        // 16-bit pixels
        self.write_command(COLMOD)?;
        self.write_data(&[0x05])?;

        self.write_command(MADCTL)?;
        self.write_data(&[orientation.madctl()])?;

        self.write_command(SLPOUT)?;
        self.delay.delay_ms(120);
        self.write_command(DISPON)?;

        self.set_window().context("setting drawing window")
    }

    fn clear(
        &mut self,
        color: Rgb565,
    ) -> Result<()> {
        let mut frame = Framebuffer::new();
        frame.clear_buffer(color);
        self.present(&frame)
    }

    fn present(
        &mut self,
        frame: &Framebuffer,
    ) -> Result<()> {
        self.write_command(RAMWR)?;
        self.write_data(frame.as_bytes())
    }
}

// =============================================================================
// Linux wiring
// =============================================================================

/// Panel opened through spidev and the GPIO character device.
pub type HatPanel = St7735<
    linux_embedded_hal::SpidevDevice,
    linux_embedded_hal::CdevPin,
    linux_embedded_hal::CdevPin,
    linux_embedded_hal::CdevPin,
    linux_embedded_hal::Delay,
>;

/// Open the HAT's panel. The panel is not initialized yet.
pub fn open_hat(config: &crate::config::DisplayConfig) -> Result<HatPanel> {
    use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
    use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
    use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};

    let mut spi = SpidevDevice::open(&config.spi_device).with_context(|| format!("opening {}", config.spi_device))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(config.spi_speed_hz)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options).context("configuring SPI")?;

    let mut chip = Chip::new(&config.gpio_chip).with_context(|| format!("opening {}", config.gpio_chip))?;
    let mut output = |pin: u32, initial: u8, label: &str| -> Result<CdevPin> {
        let handle = chip
            .get_line(pin)
            .with_context(|| format!("getting {label} line {pin}"))?
            .request(LineRequestFlags::OUTPUT, initial, label)
            .with_context(|| format!("requesting {label} line {pin} (is another screensaver running?)"))?;
        CdevPin::new(handle).with_context(|| format!("creating {label} pin"))
    };

    let dc = output(config.dc_pin, 0, "lcd-dc")?;
    let rst = output(config.rst_pin, 1, "lcd-rst")?;
    let backlight = output(config.bl_pin, 1, "lcd-bl")?;

    Ok(St7735::new(spi, dc, rst, backlight, Delay {}).with_offsets(config.x_offset, config.y_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
    use embedded_hal::spi::{ErrorType, Operation};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Bus event seen by the mock panel.
    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Command(u8),
        Data(Vec<u8>),
    }

    #[derive(Default)]
    struct Bus {
        dc_high: bool,
        events: Vec<Event>,
        largest_write: usize,
    }

    struct MockSpi(Rc<RefCell<Bus>>);
    struct MockDc(Rc<RefCell<Bus>>);
    struct MockPin;
    struct NoDelay;

    impl ErrorType for MockSpi {
        type Error = core::convert::Infallible;
    }

    impl SpiDevice for MockSpi {
        fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> Result<(), Self::Error> {
            let mut bus = self.0.borrow_mut();
            for op in operations {
                if let Operation::Write(data) = op {
                    bus.largest_write = bus.largest_write.max(data.len());
                    if bus.dc_high {
                        match bus.events.last_mut() {
                            Some(Event::Data(existing)) => existing.extend_from_slice(data),
                            _ => bus.events.push(Event::Data(data.to_vec())),
                        }
                    } else {
                        bus.events.push(Event::Command(data[0]));
                    }
                }
            }
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MockDc {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for MockDc {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().dc_high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().dc_high = true;
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MockPin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }

        fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(
            &mut self,
            _ns: u32,
        ) {
        }
    }

    fn panel() -> (St7735<MockSpi, MockDc, MockPin, MockPin, NoDelay>, Rc<RefCell<Bus>>) {
        let bus = Rc::new(RefCell::new(Bus::default()));
        let panel = St7735::new(MockSpi(bus.clone()), MockDc(bus.clone()), MockPin, MockPin, NoDelay);
        (panel, bus)
    }

    #[test]
    fn test_framebuffer_is_big_endian() {
        let mut frame = Framebuffer::new();
        Pixel(Point::new(1, 0), Rgb565::RED).draw(&mut frame).unwrap();
        assert_eq!(&frame.as_bytes()[2..4], &[0xF8, 0x00]);
        assert_eq!(frame.pixel(1, 0), Some(Rgb565::RED));
        assert_eq!(frame.pixel(128, 0), None);
    }

    #[test]
    fn test_fill_solid_clips_to_screen() {
        let mut frame = Framebuffer::new();
        Rectangle::new(Point::new(120, 120), Size::new(20, 20))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::GREEN))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(frame.pixel(127, 127), Some(Rgb565::GREEN));
        assert_eq!(frame.pixel(119, 127), Some(Rgb565::BLACK));
    }

    #[test]
    fn test_fill_contiguous_skips_clipped_colors() {
        let mut frame = Framebuffer::new();
        let area = Rectangle::new(Point::new(-1, 0), Size::new(2, 1));
        frame.fill_contiguous(&area, [Rgb565::RED, Rgb565::BLUE]).unwrap();
        assert_eq!(frame.pixel(0, 0), Some(Rgb565::BLUE));
    }

    #[test]
    fn test_initialize_sets_window_with_offsets() {
        let (mut panel, bus) = panel();
        panel.initialize(Orientation::Upright).unwrap();
        let events = &bus.borrow().events;
        assert!(events.contains(&Event::Command(MADCTL)));
        let caset = events.iter().position(|e| *e == Event::Command(CASET)).unwrap();
        assert_eq!(events[caset + 1], Event::Data(vec![0, 1, 0, 128]));
        let raset = events.iter().position(|e| *e == Event::Command(RASET)).unwrap();
        assert_eq!(events[raset + 1], Event::Data(vec![0, 2, 0, 129]));
    }

    #[test]
    fn test_offset_override() {
        let (panel, bus) = panel();
        let mut panel = panel.with_offsets(Some(0), Some(0));
        panel.initialize(Orientation::Upright).unwrap();
        let events = &bus.borrow().events;
        let caset = events.iter().position(|e| *e == Event::Command(CASET)).unwrap();
        assert_eq!(events[caset + 1], Event::Data(vec![0, 0, 0, 127]));
    }

    #[test]
    fn test_present_streams_whole_frame_in_chunks() {
        let (mut panel, bus) = panel();
        let mut frame = Framebuffer::new();
        frame.clear_buffer(Rgb565::WHITE);
        panel.present(&frame).unwrap();

        let bus = bus.borrow();
        assert_eq!(bus.events[0], Event::Command(RAMWR));
        match &bus.events[1] {
            Event::Data(data) => {
                assert_eq!(data.len(), BUFFER_SIZE);
                assert!(data.iter().all(|&b| b == 0xFF));
            }
            other => panic!("expected frame data, got {other:?}"),
        }
        assert!(bus.largest_write <= SPI_CHUNK);
    }
}
