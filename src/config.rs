/// Tunables shared by the detectors and attacks.
///
/// None of these change what an attack recovers; they only change the bytes
/// sent to the oracle and how far a search is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackConfig {
    /// Byte used for filler runs sent to encryption oracles.
    pub filler: u8,
    /// Largest filler run tried while looking for the block size.
    pub block_size_window: usize,
    /// Value of the crafted-block bytes a padding oracle never inspects.
    pub crafted_filler: u8,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            filler: 0xff,
            block_size_window: 256,
            crafted_filler: 0xe0,
        }
    }
}

impl AttackConfig {
    pub fn with_filler(mut self, filler: u8) -> Self {
        self.filler = filler;
        self
    }

    pub fn with_block_size_window(mut self, window: usize) -> Self {
        self.block_size_window = window;
        self
    }

    pub fn with_crafted_filler(mut self, crafted_filler: u8) -> Self {
        self.crafted_filler = crafted_filler;
        self
    }

    /// A byte guaranteed to differ from `filler`.
    pub(crate) fn separator(&self) -> u8 {
        !self.filler
    }

    /// A byte that differs from both `filler` and `separator()`.
    pub(crate) fn alternate_filler(&self) -> u8 {
        self.filler ^ 0x01
    }
}

#[test]
fn test_attack_config_setters() {
    let config = AttackConfig::default()
        .with_filler(b'A')
        .with_block_size_window(64)
        .with_crafted_filler(0);
    assert_eq!(b'A', config.filler);
    assert_eq!(64, config.block_size_window);
    assert_eq!(0, config.crafted_filler);
    assert_ne!(config.filler, config.separator());

    for filler in 0..=u8::MAX {
        let config = AttackConfig::default().with_filler(filler);
        assert_ne!(config.filler, config.alternate_filler());
        assert_ne!(config.separator(), config.alternate_filler());
    }
}
