//! Effect registry: the catalog of everything the suite can run.
//!
//! The registry is built once at startup and passed by reference to the CLI,
//! the orchestrator and the service installer. Each descriptor pairs a menu
//! id with the effect's key; the key is what the launcher resolves into a
//! command line.

use screensaver_common::EffectKind;

/// How much a descriptor can be trusted to run unattended for days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    /// Bounded memory, recommended for the boot service.
    Stable,
    Normal,
}

/// What a descriptor starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Effect(EffectKind),
    SimpleSwitcher,
    AdvancedSwitcher,
}

/// Immutable catalog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectDescriptor {
    pub id: u32,
    pub key: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub stability: Stability,
    pub target: Target,
}

impl EffectDescriptor {
    /// The effect rendered by this entry, `None` for the switchers.
    pub const fn kind(&self) -> Option<EffectKind> {
        match self.target {
            Target::Effect(kind) => Some(kind),
            _ => None,
        }
    }
}

const fn effect(
    id: u32,
    kind: EffectKind,
    name: &'static str,
    category: &'static str,
    description: &'static str,
) -> EffectDescriptor {
    EffectDescriptor {
        id,
        key: kind.key(),
        name,
        category,
        description,
        stability: Stability::Normal,
        target: Target::Effect(kind),
    }
}

const fn stable(mut descriptor: EffectDescriptor) -> EffectDescriptor {
    descriptor.stability = Stability::Stable;
    descriptor
}

/// Full catalog, in menu order.
pub const CATALOG: &[EffectDescriptor] = &[
    stable(effect(
        1,
        EffectKind::GlyphRainStable,
        "Fixed Matrix Rain (Stable)",
        "Matrix/Rain",
        "Memory-safe classic matrix rain with capped trails",
    )),
    effect(
        2,
        EffectKind::GlyphRainClassic,
        "Classic Matrix Rain",
        "Matrix/Rain",
        "Green falling characters in Matrix style",
    ),
    effect(
        3,
        EffectKind::GlyphRainBlue,
        "Blue Matrix Rain",
        "Matrix/Rain",
        "Blue matrix theme with faster movement",
    ),
    effect(
        4,
        EffectKind::GlyphRainRainbow,
        "Rainbow Matrix Rain",
        "Matrix/Rain",
        "Rainbow colored matrix with shifting hues",
    ),
    effect(
        5,
        EffectKind::MatrixBinary,
        "Binary Matrix",
        "Matrix/Rain",
        "Matrix of ones and zeros with bright leads",
    ),
    effect(
        6,
        EffectKind::NeonRain,
        "Neon Rain",
        "Matrix/Rain",
        "Tiny neon shapes in green and blue",
    ),
    effect(
        7,
        EffectKind::TimerMedium,
        "Medium Timer Rain",
        "Timer",
        "Characters accumulate over several hours",
    ),
    effect(
        8,
        EffectKind::TimerAllDay,
        "All-Day Timer Rain",
        "Timer",
        "Very slow accumulation for 8+ hour periods",
    ),
    effect(
        9,
        EffectKind::Raindrops,
        "Raindrops",
        "Water",
        "Realistic rain with splashes and puddles",
    ),
    effect(10, EffectKind::HeavyRain, "Heavy Rain", "Water", "Intense downpour with flooding"),
    effect(
        11,
        EffectKind::MicroDots,
        "Micro Dots",
        "Particles",
        "Ultra-tiny pixel dots at maximum density",
    ),
    effect(
        12,
        EffectKind::MicroDotsDripping,
        "Dripping Dots",
        "Particles",
        "Dots that accumulate and drip through bottom",
    ),
    stable(effect(
        13,
        EffectKind::SimpleFlames,
        "Simple Flames",
        "Fire",
        "Simple stable flame effect",
    )),
    effect(14, EffectKind::Campfire, "Campfire", "Fire", "Cozy flickering campfire"),
    effect(
        15,
        EffectKind::RetroGeometry,
        "Retro Geometry",
        "Retro",
        "Classic 1990s geometric shapes",
    ),
    effect(
        16,
        EffectKind::PlasmaField,
        "Plasma Field",
        "Retro",
        "Mathematical plasma effect",
    ),
    effect(
        17,
        EffectKind::BouncingBalls,
        "Bouncing Balls",
        "Visual",
        "Classic bouncing balls with trails",
    ),
    effect(
        18,
        EffectKind::Kaleidoscope,
        "Kaleidoscope",
        "Visual",
        "Symmetrical rotating patterns",
    ),
    effect(
        19,
        EffectKind::Mandelbrot,
        "Mandelbrot Set",
        "Fractals",
        "Classic fractal with zooming animation",
    ),
    effect(
        20,
        EffectKind::JuliaSet,
        "Julia Set",
        "Fractals",
        "Dynamic Julia sets with morphing parameters",
    ),
    effect(
        21,
        EffectKind::Sierpinski,
        "Sierpinski Triangle",
        "Fractals",
        "Fractal generation using chaos game",
    ),
    effect(
        22,
        EffectKind::DragonCurve,
        "Dragon Curve",
        "Fractals",
        "L-system fractal with growing complexity",
    ),
    effect(
        23,
        EffectKind::StarfieldWarp,
        "Starfield Warp",
        "Visual",
        "Stars streaking past at pulsing warp speed",
    ),
    effect(
        24,
        EffectKind::Spirograph,
        "Spirograph",
        "Visual",
        "Hypotrochoid curves drawn in shifting colors",
    ),
    effect(
        25,
        EffectKind::WalkingTriangle,
        "Walking Triangle",
        "Retro",
        "Spinning triangle on a random walk, leaving a trail",
    ),
    effect(
        26,
        EffectKind::WalkingSquare,
        "Walking Square",
        "Retro",
        "Breathing square on a random walk, leaving a trail",
    ),
    effect(
        27,
        EffectKind::WalkingStar,
        "Walking Star",
        "Retro",
        "Pulsing five-pointed star spinning on a random walk",
    ),
    effect(
        28,
        EffectKind::RecursivePolygons,
        "Recursive Polygons",
        "Retro",
        "Nested hexagons rotating and pulsing",
    ),
    effect(
        29,
        EffectKind::SpiralColors,
        "Spiral Colors",
        "Psychedelic",
        "Rotating rainbow spiral arm",
    ),
    effect(
        30,
        EffectKind::LiquidMetal,
        "Liquid Metal",
        "Psychedelic",
        "Molten copper ripples",
    ),
    effect(
        31,
        EffectKind::ColorShimmer,
        "Color Shimmer",
        "Psychedelic",
        "Living noise cloud with hue cycling and sparkles",
    ),
    effect(
        32,
        EffectKind::FlowField,
        "Flow Field",
        "Particles",
        "Particles steered by a drifting vector field",
    ),
    effect(
        33,
        EffectKind::FireflySwarm,
        "Firefly Swarm",
        "Particles",
        "Glowing fireflies drifting in the dark",
    ),
    effect(
        34,
        EffectKind::DigitalDreams,
        "Digital Dreams",
        "Particles",
        "Drifting nodes linking up, with rings and golden bursts",
    ),
    EffectDescriptor {
        id: 80,
        key: "simple_button_switcher",
        name: "Button Switcher (3 buttons)",
        category: "Interactive",
        description: "KEY1 next, KEY2 previous, KEY3 exit",
        stability: Stability::Normal,
        target: Target::SimpleSwitcher,
    },
    EffectDescriptor {
        id: 81,
        key: "button_screensaver",
        name: "Advanced Button Switcher",
        category: "Interactive",
        description: "Keys and joystick: favourites, pause and info",
        stability: Stability::Normal,
        target: Target::AdvancedSwitcher,
    },
];

/// Keys cycled by the three-button switcher.
pub const SIMPLE_PLAYLIST: &[&str] = &[
    "glyph_rain1_fixed",
    "glyph_rain2",
    "glyph_rain3",
    "neon_rain",
    "simple_flames",
    "plasma_field",
    "bouncing_balls",
    "kaleidoscope",
    "micro_dots",
    "raindrops",
];

/// Playlist positions reachable with joystick UP in the advanced switcher.
pub const FAVOURITES: [usize; 4] = [0, 1, 4, 5];

/// Ordered, immutable set of descriptors.
#[derive(Clone, Debug)]
pub struct EffectRegistry {
    entries: Vec<EffectDescriptor>,
}

impl EffectRegistry {
    /// The full catalog.
    pub fn builtin() -> Self { Self::from_entries(CATALOG.to_vec()) }

    pub fn from_entries(entries: Vec<EffectDescriptor>) -> Self { Self { entries } }

    pub fn all(&self) -> &[EffectDescriptor] { &self.entries }

    pub fn by_id(
        &self,
        id: u32,
    ) -> Option<&EffectDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Lookup by key, accepting the legacy aliases of the effect keys.
    pub fn by_key(
        &self,
        key: &str,
    ) -> Option<&EffectDescriptor> {
        let canonical = EffectKind::from_key(key).map_or(key, |kind| kind.key());
        self.entries.iter().find(|d| d.key == canonical)
    }

    /// Lookup by numeric id or by key.
    pub fn resolve(
        &self,
        selector: &str,
    ) -> Option<&EffectDescriptor> {
        match selector.parse::<u32>() {
            Ok(id) => self.by_id(id),
            Err(_) => self.by_key(selector),
        }
    }

    /// Descriptors that render an effect (no switchers).
    pub fn renderable(&self) -> impl Iterator<Item = &EffectDescriptor> { self.entries.iter().filter(|d| d.kind().is_some()) }

    /// Ids of `keys`, skipping unknown keys.
    pub fn playlist(
        &self,
        keys: &[&str],
    ) -> Vec<u32> {
        keys.iter().filter_map(|k| self.by_key(k)).map(|d| d.id).collect()
    }

    /// Every renderable effect, in menu order.
    pub fn full_playlist(&self) -> Vec<u32> { self.renderable().map(|d| d.id).collect() }

    /// Descriptors grouped by category, categories in first-seen order.
    pub fn by_category(&self) -> Vec<(&'static str, Vec<&EffectDescriptor>)> {
        let mut groups: Vec<(&'static str, Vec<&EffectDescriptor>)> = Vec::new();
        for descriptor in &self.entries {
            match groups.iter_mut().find(|(c, _)| *c == descriptor.category) {
                Some((_, members)) => members.push(descriptor),
                None => groups.push((descriptor.category, vec![descriptor])),
            }
        }
        groups
    }
}

impl Default for EffectRegistry {
    fn default() -> Self { Self::builtin() }
}

// =============================================================================
// Unit Tests
// =============================================================================
