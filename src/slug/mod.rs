use rand::Rng;

use crate::core::domain::Slugs;

/// Length of the short slug
pub const SHORT_SLUG_LEN: usize = 6;

/// Number of dictionary words in the long slug
pub const LONG_SLUG_WORDS: usize = 3;

/// Bytes of entropy in a channel secret before hex encoding
pub const SECRET_LEN: usize = 16;

// Lowercase letters and digits with the ambiguous ones removed
// (0/o, 1/l/i) so slugs survive being read aloud or handwritten.
const ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

const WORDS: &[&str] = &[
    "acorn", "amber", "anchor", "apple", "arrow", "aspen", "badge", "bamboo",
    "basil", "beacon", "berry", "birch", "breeze", "brook", "cabin", "candle",
    "canyon", "cedar", "cherry", "clover", "cobalt", "comet", "copper", "coral",
    "cotton", "cricket", "crystal", "dawn", "delta", "drift", "eagle", "ember",
    "fable", "falcon", "fern", "flint", "forest", "fox", "garnet", "ginger",
    "glacier", "grove", "hazel", "heath", "heron", "holly", "ivory", "jade",
    "juniper", "kite", "lagoon", "lantern", "lark", "lemon", "lily", "lotus",
    "maple", "marble", "meadow", "mint", "moss", "night", "oak", "ocean",
    "olive", "onyx", "orchid", "otter", "pebble", "pine", "plum", "pond",
    "poppy", "prairie", "quartz", "raven", "reef", "ridge", "river", "robin",
    "rose", "saffron", "sage", "shore", "sierra", "silver", "sparrow", "spruce",
    "stone", "storm", "summit", "thistle", "timber", "tulip", "violet", "willow",
];

/// Pure generator of short and long channel slugs plus owner secrets.
///
/// Values are random (thread-local CSPRNG); structure is fixed. Collision
/// handling belongs to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugGenerator;

impl SlugGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Short slug: `SHORT_SLUG_LEN` characters from the low-ambiguity alphabet
    pub fn short_slug(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..SHORT_SLUG_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Long slug: `LONG_SLUG_WORDS` dictionary words joined by `-`
    pub fn long_slug(&self) -> String {
        let mut rng = rand::thread_rng();
        let words: Vec<&str> = (0..LONG_SLUG_WORDS)
            .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
            .collect();
        words.join("-")
    }

    /// One short/long pair for a single creation attempt
    pub fn slugs(&self) -> Slugs {
        Slugs {
            short: self.short_slug(),
            long: self.long_slug(),
        }
    }

    /// Opaque hex-encoded capability token for channel renewal
    pub fn secret(&self) -> String {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().fill(&mut bytes);
        hex::encode(bytes)
    }
}
