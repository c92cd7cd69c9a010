//! Known revenue acts

/// An act the extractor recognizes by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownAct {
    pub name: &'static str,

    /// Still in force
    pub current: bool,

    /// Administered as revenue legislation
    pub revenue: bool,
}

const fn act(name: &'static str, current: bool) -> KnownAct {
    KnownAct {
        name,
        current,
        revenue: true,
    }
}

pub const KNOWN_ACTS: &[KnownAct] = &[
    act("Duties Act 1997", true),
    act("Payroll Tax Act 2007", true),
    act("Land Tax Act 1956", true),
    act("Land Tax Management Act 1956", true),
    act("Revenue Administration Act 1996", true),
    act("Fines Act 1996", true),
    act("Penalty Notices Enforcement Act 2022", true),
    // Superseded by the Duties Act 1997
    act("Stamp Duties Act 1920", false),
];

/// Oldest year accepted for an act missing from [`KNOWN_ACTS`]
const MIN_UNKNOWN_ACT_YEAR: i32 = 1950;

/// Find the known act a cited name refers to.
///
/// A cited name without a year matches the known act of the same name.
pub fn lookup(act_name: &str) -> Option<&'static KnownAct> {
    let cited = act_name.to_lowercase();
    let has_year = trailing_year(act_name).is_some();

    KNOWN_ACTS.iter().find(|known| {
        let name = known.name.to_lowercase();
        cited.contains(&name) || (!has_year && name.starts_with(&format!("{} ", cited)))
    })
}

/// Whether an unrecognized act name looks like a real citation
pub fn is_plausible(act_name: &str, year: Option<i32>) -> bool {
    act_name.to_lowercase().contains("act")
        && act_name.chars().count() > 5
        && year.map_or(true, |y| y >= MIN_UNKNOWN_ACT_YEAR)
}

/// Four-digit year at the end of an act name
pub fn trailing_year(act_name: &str) -> Option<i32> {
    let last = act_name.split_whitespace().last()?;
    if last.len() == 4 && last.chars().all(|c| c.is_ascii_digit()) {
        last.parse().ok()
    } else {
        None
    }
}
