//! Frame-rate speed levels.
//!
//! Ten discrete levels scale how fast every effect animates. The multiplier
//! divides an effect's nominal frame delay, so level 10 runs 2.5x faster and
//! level 1 runs at a tenth of the nominal rate.

/// Speed multiplier for each level, index 0 = level 1.
pub const SPEED_MULTIPLIERS: [f32; 10] = [0.1, 0.2, 0.4, 0.6, 0.8, 1.0, 1.3, 1.6, 2.0, 2.5];

/// Level whose multiplier is exactly 1.0.
pub const NORMAL_LEVEL: u8 = 6;

/// Animation speed level in `1..=10`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    /// Nominal speed (multiplier 1.0).
    pub const NORMAL: Self = Self(NORMAL_LEVEL);

    /// Create a level, returning `None` outside `1..=10`.
    pub const fn new(level: u8) -> Option<Self> {
        if level >= 1 && level <= 10 { Some(Self(level)) } else { None }
    }

    /// The level number in `1..=10`.
    pub const fn level(self) -> u8 { self.0 }

    /// Frame delay multiplier for this level.
    pub const fn multiplier(self) -> f32 { SPEED_MULTIPLIERS[(self.0 - 1) as usize] }

    /// Cycle to the next level: 1 -> 2 -> ... -> 10 -> 1
    pub const fn next(self) -> Self {
        if self.0 >= 10 { Self(1) } else { Self(self.0 + 1) }
    }

    /// Cycle to the previous level: 10 -> 9 -> ... -> 1 -> 10
    pub const fn previous(self) -> Self {
        if self.0 <= 1 { Self(10) } else { Self(self.0 - 1) }
    }

    /// Scale a nominal frame delay in milliseconds by this level.
    pub fn scale_delay_ms(
        self,
        nominal_ms: u32,
    ) -> u32 {
        (nominal_ms as f32 / self.multiplier() + 0.5) as u32
    }
}

impl Default for SpeedLevel {
    fn default() -> Self { Self::NORMAL }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_default_is_unity() {
        assert_eq!(SpeedLevel::default().multiplier(), 1.0);
        assert_eq!(SpeedLevel::default().level(), 6);
    }

    #[test]
    fn test_speed_bounds() {
        assert!(SpeedLevel::new(0).is_none());
        assert!(SpeedLevel::new(11).is_none());
        assert_eq!(SpeedLevel::new(10).map(SpeedLevel::multiplier), Some(2.5));
    }

    #[test]
    fn test_speed_next_wraps() {
        let top = SpeedLevel::new(10).unwrap();
        assert_eq!(top.next().level(), 1);
        assert_eq!(SpeedLevel::new(1).unwrap().previous().level(), 10);
    }

    #[test]
    fn test_speed_scales_delay() {
        let fast = SpeedLevel::new(10).unwrap();
        assert_eq!(fast.scale_delay_ms(50), 20);
        let slow = SpeedLevel::new(1).unwrap();
        assert_eq!(slow.scale_delay_ms(50), 500);
    }
}
