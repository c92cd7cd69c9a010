//! Tax estimates from the configured rate schedules
//!
//! Land tax and transfer duty use marginal bands: the band a value falls in
//! supplies a base amount plus a rate on the excess over its threshold.
//! Payroll tax is a flat rate on wages above the tax-free threshold.

use crate::classifier::QueryEntities;
use serde::Serialize;
use std::collections::BTreeMap;
use taxlex_common::config::{CalculationConfig, RateBand};
use taxlex_common::errors::{AppError, Result};
use taxlex_common::Category;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxKind {
    LandTax,
    PayrollTax,
    StampDuty,
}

/// Reporting period of a payroll tax estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    #[default]
    Annual,
    Monthly,
}

/// One step of a calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownLine {
    pub description: String,

    /// Part of the value this line applies to
    pub amount: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Negative for reductions
    pub tax: f64,
}

impl BreakdownLine {
    fn new(description: impl Into<String>, amount: f64, rate: Option<f64>, tax: f64) -> Self {
        Self {
            description: description.into(),
            amount,
            rate,
            tax,
        }
    }
}

/// Estimated liability for one tax
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxCalculation {
    pub tax: TaxKind,
    pub assessed_value: f64,
    pub total: f64,
    pub breakdown: Vec<BreakdownLine>,
    pub exemptions_applied: Vec<String>,
    pub concessions_applied: Vec<String>,

    /// Charges levied on top of `total`, by name
    pub additional_charges: BTreeMap<String, f64>,

    pub warnings: Vec<String>,
}

impl TaxCalculation {
    fn new(tax: TaxKind, assessed_value: f64) -> Self {
        Self {
            tax,
            assessed_value,
            total: 0.0,
            breakdown: Vec::new(),
            exemptions_applied: Vec::new(),
            concessions_applied: Vec::new(),
            additional_charges: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Total including additional charges
    pub fn total_payable(&self) -> f64 {
        self.total + self.additional_charges.values().sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PropertyPurchase {
    pub value: f64,
    pub first_home_buyer: bool,
    pub foreign_purchaser: bool,
    pub principal_residence: bool,
}

/// Facts for a combined estimate
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scenario {
    pub property: Option<PropertyPurchase>,
    pub annual_payroll: Option<f64>,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_dollars(value: f64) -> f64 {
    value.round()
}

/// Band covering `value`: the last one whose threshold it exceeds
fn marginal_band(bands: &[RateBand], value: f64) -> Option<&RateBand> {
    bands.iter().rev().find(|band| value > band.threshold)
}

fn check_value(value: f64, field: &str) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation {
            message: format!("{} must be a non-negative amount, got {}", field, value),
            field: Some(field.to_string()),
        })
    }
}

/// Computes land tax, payroll tax and transfer duty estimates
#[derive(Debug, Clone)]
pub struct TaxCalculator {
    config: CalculationConfig,
}

impl TaxCalculator {
    pub fn new(config: CalculationConfig) -> Result<Self> {
        config.check_schedules()?;
        Ok(Self { config })
    }

    /// Annual land tax on a land value, rounded to the cent.
    ///
    /// A principal place of residence is fully exempt. Land valued above the
    /// premium threshold carries a premium property charge on the whole value.
    pub fn land_tax(&self, land_value: f64, principal_residence: bool) -> Result<TaxCalculation> {
        check_value(land_value, "land_value")?;
        let mut calc = TaxCalculation::new(TaxKind::LandTax, land_value);

        if principal_residence {
            calc.exemptions_applied.push("principal_place_of_residence".to_string());
            calc.breakdown.push(BreakdownLine::new(
                "Principal place of residence exemption",
                land_value,
                None,
                0.0,
            ));
            return Ok(calc);
        }

        match marginal_band(&self.config.land_tax_bands, land_value) {
            Some(band) => {
                let excess = land_value - band.threshold;
                let tax = round_cents(band.base + excess * band.rate);
                calc.breakdown.push(BreakdownLine::new(
                    format!("Land value above ${:.0}", band.threshold),
                    excess,
                    Some(band.rate),
                    tax,
                ));
                calc.total = tax;
            }
            None => {
                calc.exemptions_applied.push("below_threshold".to_string());
                calc.breakdown.push(BreakdownLine::new(
                    "Land value below the tax-free threshold",
                    land_value,
                    None,
                    0.0,
                ));
            }
        }

        if land_value > self.config.premium_property_threshold {
            let charge = round_cents(land_value * self.config.premium_property_rate);
            calc.additional_charges.insert("premium_property".to_string(), charge);
            calc.warnings.push(format!(
                "Premium property charge of {:.1}% applies to land valued over ${:.0}",
                self.config.premium_property_rate * 100.0,
                self.config.premium_property_threshold
            ));
        }

        Ok(calc)
    }

    /// Payroll tax on annual wages, rounded to the dollar. Wages at or below
    /// the threshold are exempt; a monthly estimate is a twelfth of the annual.
    pub fn payroll_tax(&self, annual_wages: f64, period: Period) -> Result<TaxCalculation> {
        check_value(annual_wages, "annual_wages")?;
        let mut calc = TaxCalculation::new(TaxKind::PayrollTax, annual_wages);
        let threshold = self.config.payroll_threshold;
        let divisor = match period {
            Period::Annual => 1.0,
            Period::Monthly => 12.0,
        };

        if annual_wages <= threshold {
            calc.exemptions_applied.push("below_threshold".to_string());
            calc.breakdown.push(BreakdownLine::new(
                format!("Annual wages within the tax-free threshold of ${:.0}", threshold),
                annual_wages,
                None,
                0.0,
            ));
            return Ok(calc);
        }

        let taxable = annual_wages - threshold;
        let tax = taxable * self.config.payroll_rate / divisor;
        calc.breakdown.push(BreakdownLine::new("Tax-free threshold", threshold, None, 0.0));
        calc.breakdown.push(BreakdownLine::new(
            "Taxable wages above the threshold",
            taxable,
            Some(self.config.payroll_rate),
            round_cents(tax),
        ));
        calc.total = round_dollars(tax);
        Ok(calc)
    }

    /// Transfer duty on a purchase price, rounded to the dollar.
    ///
    /// First home buyers pay nothing up to the exemption limit and get a
    /// sliding reduction up to the concession limit. Foreign purchasers pay a
    /// surcharge on the whole value.
    pub fn stamp_duty(
        &self,
        value: f64,
        first_home_buyer: bool,
        foreign_purchaser: bool,
    ) -> Result<TaxCalculation> {
        check_value(value, "property_value")?;
        let mut calc = TaxCalculation::new(TaxKind::StampDuty, value);
        let exemption_limit = self.config.first_home_exemption_limit;
        let concession_limit = self.config.first_home_concession_limit;

        if first_home_buyer && value <= exemption_limit {
            calc.exemptions_applied.push("first_home_buyer".to_string());
            calc.breakdown.push(BreakdownLine::new(
                format!("First home buyer exemption up to ${:.0}", exemption_limit),
                value,
                None,
                0.0,
            ));
            return Ok(calc);
        }

        let mut duty = 0.0;
        if let Some(band) = marginal_band(&self.config.duty_bands, value) {
            let excess = value - band.threshold;
            duty = band.base + excess * band.rate;
            calc.breakdown.push(BreakdownLine::new(
                format!("Dutiable value above ${:.0}", band.threshold),
                excess,
                Some(band.rate),
                round_cents(duty),
            ));
        }

        if first_home_buyer && value <= concession_limit {
            let reduction = duty * (concession_limit - value) / (concession_limit - exemption_limit);
            duty -= reduction;
            calc.concessions_applied.push("first_home_buyer".to_string());
            calc.breakdown.push(BreakdownLine::new(
                "First home buyer concession",
                value,
                None,
                -round_cents(reduction),
            ));
        }

        if foreign_purchaser {
            let surcharge = round_dollars(value * self.config.foreign_purchaser_rate);
            calc.additional_charges.insert("foreign_purchaser".to_string(), surcharge);
            calc.warnings.push(format!(
                "Foreign purchaser surcharge of {:.0}% applies",
                self.config.foreign_purchaser_rate * 100.0
            ));
        }

        calc.total = round_dollars(duty);
        Ok(calc)
    }

    /// Every tax a scenario attracts: duty and ongoing land tax for a
    /// property purchase, payroll tax for a business with wages
    pub fn scenario(&self, scenario: &Scenario) -> Result<Vec<TaxCalculation>> {
        let mut results = Vec::new();
        if let Some(property) = scenario.property {
            results.push(self.stamp_duty(
                property.value,
                property.first_home_buyer,
                property.foreign_purchaser,
            )?);
            results.push(self.land_tax(property.value, property.principal_residence)?);
        }
        if let Some(wages) = scenario.annual_payroll {
            results.push(self.payroll_tax(wages, Period::Annual)?);
        }
        Ok(results)
    }

    /// Estimates for a question, using the first dollar figure it mentions.
    /// Categories without a rate schedule yield nothing.
    pub fn for_query(
        &self,
        query: &str,
        category: Category,
        entities: &QueryEntities,
    ) -> Result<Vec<TaxCalculation>> {
        let Some(&value) = entities.dollar_values.first() else {
            return Ok(Vec::new());
        };
        let query = query.to_lowercase();
        let principal_residence =
            query.contains("principal place of residence") || query.contains("ppr");

        let results = match category {
            Category::PayrollTax => {
                let period = if query.contains("month") {
                    Period::Monthly
                } else {
                    Period::Annual
                };
                vec![self.payroll_tax(value, period)?]
            }
            Category::LandTax => vec![self.land_tax(value, principal_residence)?],
            Category::Duties => self.scenario(&Scenario {
                property: Some(PropertyPurchase {
                    value,
                    first_home_buyer: query.contains("first home"),
                    foreign_purchaser: query.contains("foreign"),
                    principal_residence,
                }),
                annual_payroll: None,
            })?,
            _ => Vec::new(),
        };

        debug!(category = %category, value = value, estimates = results.len(), "Tax estimates");
        Ok(results)
    }
}
