//! Small statute corpus shared by unit tests

use taxlex_common::{Category, Passage};

pub const PAYROLL_QUERY: &str = "What is the current payroll tax rate for wages over $1.2 million?";

const PAYROLL_RATE: &str = "Payroll tax is imposed on taxable wages paid or payable by an employer in a financial year. \
The rate of payroll tax for wages above the tax-free threshold of $1.2 million is 5.45% of the taxable wages.";

pub fn fixture_passages() -> Vec<Passage> {
    let records: Vec<(&str, String, &str, &str, Category)> = vec![
        ("pt-11", PAYROLL_RATE.to_string(), "Payroll Tax Act 2007", "11", Category::PayrollTax),
        (
            "pt-6",
            "The threshold amount for a financial year is $1.2 million. An employer that is a member of a group \
             is entitled to deduct only the group's share of the threshold from taxable wages."
                .to_string(),
            "Payroll Tax Act 2007",
            "6",
            Category::PayrollTax,
        ),
        (
            "pt-11-copy",
            format!("{} This text was repeated when the schedule was split.", PAYROLL_RATE),
            "Payroll Tax Act 2007",
            "11",
            Category::PayrollTax,
        ),
        (
            "lt-9",
            "Land tax is charged on the taxable value of all land owned by a person at midnight on 31 December, \
             calculated on the unimproved value of the land averaged over three years."
                .to_string(),
            "Land Tax Management Act 1956",
            "9",
            Category::LandTax,
        ),
        (
            "d-31",
            "Transfer duty is charged on a conveyance of dutiable property, including land in New South Wales, \
             at rates set by reference to the dutiable value of the transaction."
                .to_string(),
            "Duties Act 1997",
            "31",
            Category::Duties,
        ),
        (
            "f-14",
            "A penalty notice may be enforced by an enforcement order made against the person who failed \
             to pay the penalty amount by the due date stated in the notice."
                .to_string(),
            "Fines Act 1996",
            "14",
            Category::Fines,
        ),
        (
            "g-18",
            "An applicant is eligible for the first home owner grant if the applicant is a natural person \
             who intends to occupy the new home as a principal place of residence."
                .to_string(),
            "First Home Owner Grant (New Homes) Act 2000",
            "18",
            Category::Grants,
        ),
        (
            "ra-86",
            "A taxpayer who is dissatisfied with an assessment may lodge an objection with the Chief Commissioner \
             within 60 days after the notice of assessment is served, and may then apply for review."
                .to_string(),
            "Revenue Administration Act 1996",
            "86",
            Category::Administration,
        ),
    ];

    records
        .into_iter()
        .map(|(id, text, act, section, category)| {
            Passage::new(id, text, act, Some(section.to_string()), category).unwrap()
        })
        .collect()
}
