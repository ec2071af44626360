//! Pure combat resolution.
//!
//! No clocks, no locks, no I/O: given the attacker count, defender count,
//! and the attacker's leverage multiplier, produce the final outcome plus
//! the number of intermediate ticks the simulation should report. All
//! randomness flows through the caller-supplied generator so tests can pin
//! either branch of a probabilistic tier.

use rand::Rng;

/// Floor for the power ratio, so an empty garrison never divides by zero.
const MIN_RATIO: f64 = 0.1;

/// Terminal result of a battle, before any world mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleOutcome {
    pub success: bool,
    pub attacker_survivors: u32,
    pub defender_survivors: u32,
    /// Number of intermediate ticks to report; stronger attacks resolve in
    /// fewer ticks. Always in `2..=5`.
    pub ticks: u32,
}

/// Outcome tiers keyed by the effective power ratio.
///
/// Each row fixes the win probability and the survivor fractions for both
/// sides. A ratio of 2.0 or better wins unconditionally, with no draw from
/// the random source; defender survivors on any win are zero (the target is
/// captured outright).
fn tier(ratio: f64) -> (f64, f64, f64, f64) {
    // (win probability, attacker fraction on win, attacker fraction on
    //  loss, defender fraction on loss)
    if ratio >= 2.0 {
        (1.0, 0.7, 0.0, 0.0)
    } else if ratio >= 1.5 {
        (0.85, 0.5, 0.2, 0.6)
    } else if ratio >= 1.0 {
        (0.45, 0.3, 0.1, 0.4)
    } else {
        (0.15, 0.2, 0.0, 0.8)
    }
}

/// Resolves a battle.
///
/// `effective_attack = attackers * multiplier` and the power ratio against
/// `max(1, defenders)` selects the outcome tier. At least one attacker
/// survives a win; a rout can leave zero.
pub fn resolve<R: Rng + ?Sized>(
    attackers: u32,
    defenders: u32,
    multiplier: f64,
    rng: &mut R,
) -> BattleOutcome {
    let effective_attack = f64::from(attackers) * multiplier;
    let ratio = effective_attack / f64::from(defenders.max(1));

    let (win_probability, win_frac, lose_frac, defender_frac) = tier(ratio);
    let success = ratio >= 2.0 || rng.gen::<f64>() < win_probability;

    let (attacker_survivors, defender_survivors) = if success {
        (((f64::from(attackers) * win_frac) as u32).max(1), 0)
    } else {
        (
            (f64::from(attackers) * lose_frac) as u32,
            ((f64::from(defenders) * defender_frac) as u32).max(1),
        )
    };

    let ticks = ((10.0 / ratio.max(MIN_RATIO)).round() as u32).clamp(2, 5);

    BattleOutcome { success, attacker_survivors, defender_survivors, ticks }
}

/// Linear interpolation of a unit count at tick `step` of `ticks`.
///
/// Tick `ticks` lands exactly on the survivor value; tick 0 would be the
/// starting count.
pub fn interpolate(initial: u32, survivors: u32, step: u32, ticks: u32) -> u32 {
    let progress = f64::from(step) / f64::from(ticks.max(1));
    (f64::from(initial) * (1.0 - progress) + f64::from(survivors) * progress) as u32
}
