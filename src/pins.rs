//! GPIO / peripheral pin assignments for the PawFeeds main board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Dispenser servos (continuous rotation, one per bowl)
// ---------------------------------------------------------------------------

/// Servo signal for bowl 1.
pub const SERVO_BOWL1_GPIO: i32 = 21;
/// Servo signal for bowl 2.
pub const SERVO_BOWL2_GPIO: i32 = 22;

// ---------------------------------------------------------------------------
// Load cell (HX711), fitted on the board, not read by the firmware
// ---------------------------------------------------------------------------

pub const LOADCELL_DOUT_GPIO: i32 = 27;
pub const LOADCELL_SCK_GPIO: i32 = 26;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// Standard hobby-servo frame rate.
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// LEDC timer resolution (bits).  14-bit gives ~1.2 µs steps at 50 Hz.
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
/// Pulse width at 0°.
pub const SERVO_MIN_PULSE_US: u32 = 500;
/// Pulse width at 180°.
pub const SERVO_MAX_PULSE_US: u32 = 2_500;

// ---------------------------------------------------------------------------
// Provisioning access point
// ---------------------------------------------------------------------------

/// Open soft-AP raised while the feeder has no Wi-Fi credentials.
pub const PROVISIONING_AP_SSID: &str = "PawFeeds_Setup";
/// Port of the provisioning HTTP listener.
pub const PROVISIONING_HTTP_PORT: u16 = 80;
