//! Revenue categories and their static lookup table
//!
//! Every category owns one [`CategoryProfile`]: the vocabulary used by the query
//! classifier, the act names that identify its legislation, and the extra terms
//! appended to keyword-expansion searches.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of revenue-type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PayrollTax,
    LandTax,
    Duties,
    Fines,
    Grants,
    Administration,
    General,
}

/// Static classification and retrieval data for one category
#[derive(Debug)]
pub struct CategoryProfile {
    /// Substrings counted as keyword hits (matched lowercase)
    pub keywords: &'static [&'static str],
    /// Case-insensitive regular expressions
    pub patterns: &'static [&'static str],
    /// Category-specific calculation vocabulary
    pub calculation_terms: &'static [&'static str],
    /// Act-name fragments identifying this category's legislation
    pub acts: &'static [&'static str],
    /// Terms added to keyword-expansion searches
    pub boost_terms: &'static [&'static str],
}

const PAYROLL_TAX: CategoryProfile = CategoryProfile {
    keywords: &[
        "payroll tax", "payroll", "wages", "salary", "employer", "employee", "threshold",
        "1.2 million", "$1,200,000", "monthly wages", "annual wages", "group employer",
    ],
    patterns: &[
        r"payroll\s+tax",
        r"wages.*tax",
        r"employer.*tax",
        r"payroll.*rate",
        r"payroll.*threshold",
        r"1\.2\s*million",
        r"\$1,?200,?000",
    ],
    calculation_terms: &[
        "rate", "calculate", "calculation", "amount", "percentage", "5.45%", "rate of", "how much",
    ],
    acts: &["Payroll Tax Act"],
    boost_terms: &["payroll", "wages", "employer"],
};

const LAND_TAX: CategoryProfile = CategoryProfile {
    keywords: &[
        "land tax", "property tax", "land value", "unimproved value", "land tax threshold",
        "exemption", "primary residence", "principal place of residence", "land tax assessment",
    ],
    patterns: &[
        r"land\s+tax",
        r"property.*tax",
        r"land.*value",
        r"unimproved.*value",
        r"land.*assessment",
        r"principal.*place.*residence",
        r"primary.*residence",
    ],
    calculation_terms: &["assessment", "value", "exemption", "threshold", "calculate", "amount owed"],
    acts: &["Land Tax Act", "Land Tax Management Act"],
    boost_terms: &["land", "property", "unimproved"],
};

const DUTIES: CategoryProfile = CategoryProfile {
    keywords: &[
        "stamp duty", "duty", "conveyance", "transfer duty", "property purchase", "real estate",
        "conveyancing", "first home buyer", "concession", "exemption",
    ],
    patterns: &[
        r"stamp\s+duty",
        r"transfer\s+duty",
        r"conveyance.*duty",
        r"property.*purchase",
        r"real\s+estate.*duty",
        r"first\s+home.*buyer",
        r"duty.*rate",
    ],
    calculation_terms: &["rate", "calculate", "amount", "percentage", "cost", "how much", "purchase price"],
    acts: &["Duties Act", "Stamp Duties Act"],
    boost_terms: &["duty", "stamp", "conveyance"],
};

const FINES: CategoryProfile = CategoryProfile {
    keywords: &[
        "fine", "penalty", "infringement", "enforcement", "penalty notice", "court", "appeal",
        "dispute", "late payment", "penalty interest",
    ],
    patterns: &[
        r"fine",
        r"penalty",
        r"infringement",
        r"penalty.*notice",
        r"late.*payment",
        r"penalty.*interest",
        r"court.*order",
    ],
    calculation_terms: &["amount", "interest", "additional", "late fee"],
    acts: &["Fines Act", "Penalty Notices"],
    boost_terms: &["penalty", "fine", "enforcement"],
};

const GRANTS: CategoryProfile = CategoryProfile {
    keywords: &[
        "grant", "first home owner grant", "fhog", "rebate", "concession", "assistance",
        "eligible", "eligibility", "first home buyer",
    ],
    patterns: &[
        r"first\s+home.*grant",
        r"fhog",
        r"grant.*eligible",
        r"rebate",
        r"first.*home.*buyer.*grant",
        r"home.*buyer.*assistance",
    ],
    calculation_terms: &["eligible", "qualify", "amount", "how much"],
    acts: &["First Home Owner Grant"],
    boost_terms: &["grant", "first home", "eligible"],
};

const ADMINISTRATION: CategoryProfile = CategoryProfile {
    keywords: &[
        "assessment", "review", "objection", "appeal", "audit", "investigation", "notice",
        "determination", "administrative", "revenue nsw", "ruling",
    ],
    patterns: &[
        r"assessment.*review",
        r"objection",
        r"appeal.*decision",
        r"revenue.*nsw",
        r"administrative.*decision",
        r"tax.*ruling",
    ],
    calculation_terms: &["process", "procedure", "timeline", "deadline"],
    acts: &["Revenue Administration Act"],
    boost_terms: &["assessment", "review", "appeal"],
};

const GENERAL: CategoryProfile = CategoryProfile {
    keywords: &[],
    patterns: &[],
    calculation_terms: &[],
    acts: &[],
    boost_terms: &[],
};

impl Category {
    /// All categories, in tie-break order
    pub const ALL: [Category; 7] = [
        Category::PayrollTax,
        Category::LandTax,
        Category::Duties,
        Category::Fines,
        Category::Grants,
        Category::Administration,
        Category::General,
    ];

    /// Categories the classifier scores (`general` is only a fallback)
    pub const SCORED: [Category; 6] = [
        Category::PayrollTax,
        Category::LandTax,
        Category::Duties,
        Category::Fines,
        Category::Grants,
        Category::Administration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PayrollTax => "payroll_tax",
            Category::LandTax => "land_tax",
            Category::Duties => "duties",
            Category::Fines => "fines",
            Category::Grants => "grants",
            Category::Administration => "administration",
            Category::General => "general",
        }
    }

    pub fn profile(&self) -> &'static CategoryProfile {
        match self {
            Category::PayrollTax => &PAYROLL_TAX,
            Category::LandTax => &LAND_TAX,
            Category::Duties => &DUTIES,
            Category::Fines => &FINES,
            Category::Grants => &GRANTS,
            Category::Administration => &ADMINISTRATION,
            Category::General => &GENERAL,
        }
    }

    /// Whether searches can be restricted to this category's legislation
    pub fn has_act_preference(&self) -> bool {
        !self.profile().acts.is_empty()
    }

    /// Case-insensitive match of an act name against this category's acts
    pub fn matches_act(&self, act_name: &str) -> bool {
        let act = act_name.to_lowercase();
        self.profile()
            .acts
            .iter()
            .any(|known| act.contains(&known.to_lowercase()))
    }

    /// Infer a category from a file path or document name
    pub fn infer_from_name(name: &str) -> Category {
        let name = name.to_lowercase().replace(['-', ' '], "_");
        if name.contains("payroll") {
            Category::PayrollTax
        } else if name.contains("land_tax") || name.contains("landtax") {
            Category::LandTax
        } else if name.contains("dut") || name.contains("stamp") {
            Category::Duties
        } else if name.contains("fine") || name.contains("penalt") {
            Category::Fines
        } else if name.contains("grant") || name.contains("first_home") {
            Category::Grants
        } else if name.contains("administration") || name.contains("revenue_admin") {
            Category::Administration
        } else {
            Category::General
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::InvalidFormat {
                message: format!("unknown category: {}", s),
            })
    }
}
