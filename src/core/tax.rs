use serde::Serialize;

pub const PERSONAL_ALLOWANCE: f64 = 12_570.0;
/// Width of the basic-rate band, measured on taxable income.
pub const HIGHER_RATE_THRESHOLD: f64 = 37_700.0;
pub const ALLOWANCE_REDUCTION_THRESHOLD: f64 = 100_000.0;
/// Taxable income above which the additional rate applies.
pub const ADDITIONAL_RATE_THRESHOLD: f64 = 125_140.0;
pub const BASIC_RATE: f64 = 0.20;
pub const HIGHER_RATE: f64 = 0.40;
pub const ADDITIONAL_RATE: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UkTaxBands {
    pub personal_allowance: f64,
    pub higher_rate_threshold: f64,
    pub allowance_reduction_threshold: f64,
    pub additional_rate_threshold: f64,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
}

impl Default for UkTaxBands {
    fn default() -> Self {
        Self {
            personal_allowance: PERSONAL_ALLOWANCE,
            higher_rate_threshold: HIGHER_RATE_THRESHOLD,
            allowance_reduction_threshold: ALLOWANCE_REDUCTION_THRESHOLD,
            additional_rate_threshold: ADDITIONAL_RATE_THRESHOLD,
            basic_rate: BASIC_RATE,
            higher_rate: HIGHER_RATE,
            additional_rate: ADDITIONAL_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub personal_allowance: f64,
    pub taxable_income: f64,
    pub basic_tax: f64,
    pub higher_tax: f64,
    pub additional_tax: f64,
    pub total: f64,
}

impl UkTaxBands {
    pub fn personal_allowance_for(&self, income: f64) -> f64 {
        let allowance = self.personal_allowance.max(0.0);
        if income > self.allowance_reduction_threshold {
            let reduction = (income - self.allowance_reduction_threshold) / 2.0;
            (allowance - reduction).max(0.0)
        } else {
            allowance
        }
    }

    pub fn breakdown(&self, income: f64) -> TaxBreakdown {
        let gross = income.max(0.0);
        let personal_allowance = self.personal_allowance_for(gross);
        let taxable_income = (gross - personal_allowance).max(0.0);

        let higher_threshold = self.higher_rate_threshold.max(0.0);
        let additional_threshold = self.additional_rate_threshold.max(higher_threshold);

        let basic_taxable = taxable_income.min(higher_threshold);
        let higher_taxable = (taxable_income - higher_threshold)
            .min(additional_threshold - higher_threshold)
            .max(0.0);
        let additional_taxable = (taxable_income - additional_threshold).max(0.0);

        let basic_tax = basic_taxable * self.basic_rate.clamp(0.0, 1.0);
        let higher_tax = higher_taxable * self.higher_rate.clamp(0.0, 1.0);
        let additional_tax = additional_taxable * self.additional_rate.clamp(0.0, 1.0);

        TaxBreakdown {
            personal_allowance,
            taxable_income,
            basic_tax,
            higher_tax,
            additional_tax,
            total: basic_tax + higher_tax + additional_tax,
        }
    }

    pub fn income_tax(&self, income: f64) -> f64 {
        self.breakdown(income).total
    }
}

/// UK income tax owed on `income` under the default bands.
pub fn uk_income_tax(income: f64) -> f64 {
    UkTaxBands::default().income_tax(income)
}
