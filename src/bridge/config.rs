//! # Bridge Configuration

/// Policy for a child that fails to decode into the subscriber's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Drop the malformed child from list emissions and keep the feed
    /// alive (logged at WARN)
    #[default]
    SkipChild,

    /// Terminate the feed on the first malformed child; the error
    /// handler receives the decode failure
    FailFeed,
}

/// Bridge configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// How list and value feeds treat undecodable content
    pub decode_policy: DecodePolicy,
}

impl BridgeConfig {
    /// Configuration with the default skip-on-decode-error policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decode policy
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }
}
