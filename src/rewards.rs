use rand::seq::SliceRandom;
use rand::Rng;

const FULL_MULTIPLIER_LINES: [&str; 4] = [
    "Locked in before the clock. Double points.",
    "Ready on time, bars delivered. x2 earned.",
    "The villain never saw you coming. x2.",
    "Commitment paid off. Claim the double.",
];

const PENALISED_LINES: [&str; 3] = [
    "You got the work done, but missed Ready. x1 this time.",
    "Late to the booth. Points count, multiplier doesn't.",
    "Press Ready next time and this doubles.",
];

/// Flavour line for the reward gate, chosen for the session's multiplier.
pub fn reward_line<R: Rng + ?Sized>(rng: &mut R, multiplier: u8) -> &'static str {
    let lines: &[&'static str] = if multiplier > 1 {
        &FULL_MULTIPLIER_LINES
    } else {
        &PENALISED_LINES
    };
    lines.choose(rng).copied().unwrap_or(lines[0])
}

/// Points for a finished block: focused minutes times the multiplier.
pub fn award_points(focused_minutes: i64, multiplier: u8) -> i64 {
    focused_minutes.max(0) * i64::from(multiplier)
}
