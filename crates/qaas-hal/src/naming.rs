//! Human-readable job and session names.

use std::sync::{Mutex, PoisonError};

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const ADJECTIVES: &[&str] = &[
    "agile", "amber", "bold", "brave", "calm", "clever", "cosmic", "crisp", "eager", "fancy",
    "gentle", "happy", "jolly", "keen", "lucid", "mellow", "nimble", "proud", "quiet", "rapid",
    "shiny", "silent", "steady", "sunny", "swift", "tidy", "vivid", "witty", "zesty", "zen",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "crane", "dolphin", "falcon", "ferret", "gecko", "heron", "ibis", "koala",
    "lemur", "lynx", "marmot", "newt", "ocelot", "otter", "panda", "puffin", "quokka", "raven",
    "salmon", "seal", "tapir", "toucan", "turtle", "walrus", "weasel", "wombat", "yak", "zebra",
];

/// Source of generated name fragments.
pub trait NameGenerator: Send + Sync {
    /// A fresh name fragment, e.g. `"brave-otter-4821"`.
    fn generate(&self) -> String;

    /// Job name for a backend of kind `kind`: `qj-<kind>-<fragment>`.
    fn job_name(&self, kind: &str) -> String {
        format!("qj-{}-{}", kind, self.generate())
    }
}

/// Adjective-noun names drawn from a small PRNG.
#[derive(Debug)]
pub struct RandomNameGenerator {
    rng: Mutex<SmallRng>,
}

impl RandomNameGenerator {
    /// Generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl NameGenerator for RandomNameGenerator {
    fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let adjective = ADJECTIVES.choose(&mut *rng).copied().unwrap_or("quiet");
        let noun = NOUNS.choose(&mut *rng).copied().unwrap_or("otter");
        let suffix: u16 = rng.gen_range(0..10_000);
        format!("{adjective}-{noun}-{suffix:04}")
    }
}
