//! Vibration feedback on user actions. Purely cosmetic: implementations must
//! never fail or block.

/// Pulse length for transport controls (play, next, shuffle, ...)
pub const TRANSPORT_PULSE_MS: u32 = 5;

/// Pulse length for navigation, fullscreen and favorite toggles
pub const NAVIGATION_PULSE_MS: u32 = 10;

/// Vibration pattern played when the admin gate opens
pub const ADMIN_GRANTED_PATTERN: [u32; 3] = [50, 50, 50];

pub trait Haptics: Send + Sync {
    /// Vibrate following `pattern`, alternating on/off milliseconds
    fn vibrate(&self, pattern: &[u32]);

    fn pulse(&self, millis: u32) {
        self.vibrate(&[millis]);
    }
}

/// Device without a vibration motor
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn vibrate(&self, _pattern: &[u32]) {}
}
