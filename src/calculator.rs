//! Business-plan funnel math.
//!
//! Two independent plans are derived from the same [`GoalInputs`]:
//!
//! - the **Simplified** plan starts from a closings dollar goal and rounds
//!   unit counts (floor for originations, ceil when chunking down);
//! - the **High-Trust** plan starts from an income goal and keeps every step
//!   fractional.
//!
//! Zero denominators are not guarded and surface as `inf`/`NaN`.

use serde::{Deserialize, Deserializer, Serialize};

const MONTHS_PER_YEAR: f64 = 12.0;
const WEEKS_PER_YEAR: f64 = 52.0;
const WORKDAYS_PER_WEEK: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalInputs {
    pub avg_loan_amount: f64,
    pub annual_closings_dollar_goal: f64,
    pub pull_through_rate: f64,
    pub conversion_to_app: f64,
    pub total_referral_partners: u32,
    pub annual_income_goal: f64,
    pub avg_commission_basis_points: f64,
    pub pre_qual_to_app_rate: f64,
}

impl Default for GoalInputs {
    fn default() -> Self {
        Self {
            avg_loan_amount: 300_000.0,
            annual_closings_dollar_goal: 30_000_000.0,
            pull_through_rate: 0.8,
            conversion_to_app: 0.5,
            total_referral_partners: 10,
            annual_income_goal: 250_000.0,
            avg_commission_basis_points: 0.01,
            pre_qual_to_app_rate: 0.5,
        }
    }
}

impl GoalInputs {
    /// Checks that every field is a finite, non-negative number and that
    /// rates stay within `0..=1`. Zero is accepted.
    pub fn validate(&self) -> Result<(), String> {
        let amounts = [
            ("avgLoanAmount", self.avg_loan_amount),
            ("annualClosingsDollarGoal", self.annual_closings_dollar_goal),
            ("annualIncomeGoal", self.annual_income_goal),
        ];
        let rates = [
            ("pullThroughRate", self.pull_through_rate),
            ("conversionToApp", self.conversion_to_app),
            ("avgCommissionBasisPoints", self.avg_commission_basis_points),
            ("preQualToAppRate", self.pre_qual_to_app_rate),
        ];

        for (name, value) in amounts.iter().chain(rates.iter()) {
            if !value.is_finite() || *value < 0.0 {
                return Err(format!("{name} must be a non-negative number"));
            }
        }
        for (name, value) in rates {
            if value > 1.0 {
                return Err(format!("{name} must be between 0 and 1"));
            }
        }
        Ok(())
    }

    /// Label/value pairs in form order.
    pub fn labeled_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("Average Loan Amount", self.avg_loan_amount),
            ("Annual Closings Dollar Goal", self.annual_closings_dollar_goal),
            ("Pull-Through Rate", self.pull_through_rate),
            ("Conversion To App", self.conversion_to_app),
            ("Total Referral Partners", f64::from(self.total_referral_partners)),
            ("Annual Income Goal", self.annual_income_goal),
            ("Average Commission (bps)", self.avg_commission_basis_points),
            ("Pre-Qual To App Rate", self.pre_qual_to_app_rate),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifiedPlan {
    #[serde(deserialize_with = "f64_or_nan")]
    pub annual_closings_unit_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub annual_origination_unit_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub annual_origination_dollar_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub monthly_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub weekly_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub daily_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub daily_referred_pre_quals: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub monthly_referred_pre_quals: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub min_pre_qual_per_partner: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighTrustPlan {
    #[serde(deserialize_with = "f64_or_nan")]
    pub target_closings_dollar_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub target_closings_unit_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub annual_origination_unit_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub annual_origination_dollar_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub monthly_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub weekly_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub daily_units_goal: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub daily_pre_quals: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub monthly_pre_quals: f64,
    #[serde(deserialize_with = "f64_or_nan")]
    pub min_pre_qual_per_partner: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculated {
    pub simplified: SimplifiedPlan,
    pub high_trust: HighTrustPlan,
}

impl Calculated {
    /// Flat label/value view used by the CSV export.
    pub fn labeled_values(&self) -> Vec<(&'static str, f64)> {
        let s = &self.simplified;
        let h = &self.high_trust;
        vec![
            ("Simplified Annual Closings Unit Goal", s.annual_closings_unit_goal),
            ("Simplified Annual Origination Unit Goal", s.annual_origination_unit_goal),
            ("Simplified Annual Origination Dollar Goal", s.annual_origination_dollar_goal),
            ("Simplified Monthly Units Goal", s.monthly_units_goal),
            ("Simplified Weekly Units Goal", s.weekly_units_goal),
            ("Simplified Daily Units Goal", s.daily_units_goal),
            ("Simplified Daily Referred Pre-Quals", s.daily_referred_pre_quals),
            ("Simplified Monthly Referred Pre-Quals", s.monthly_referred_pre_quals),
            ("Simplified Min Pre-Quals Per Partner", s.min_pre_qual_per_partner),
            ("High-Trust Target Closings Dollar Goal", h.target_closings_dollar_goal),
            ("High-Trust Target Closings Unit Goal", h.target_closings_unit_goal),
            ("High-Trust Annual Origination Unit Goal", h.annual_origination_unit_goal),
            ("High-Trust Annual Origination Dollar Goal", h.annual_origination_dollar_goal),
            ("High-Trust Monthly Units Goal", h.monthly_units_goal),
            ("High-Trust Weekly Units Goal", h.weekly_units_goal),
            ("High-Trust Daily Units Goal", h.daily_units_goal),
            ("High-Trust Daily Pre-Quals", h.daily_pre_quals),
            ("High-Trust Monthly Pre-Quals", h.monthly_pre_quals),
            ("High-Trust Min Pre-Quals Per Partner", h.min_pre_qual_per_partner),
        ]
    }
}

pub fn calculate(inputs: &GoalInputs) -> Calculated {
    Calculated {
        simplified: simplified_plan(inputs),
        high_trust: high_trust_plan(inputs),
    }
}

pub fn simplified_plan(inputs: &GoalInputs) -> SimplifiedPlan {
    let annual_closings_unit_goal = inputs.annual_closings_dollar_goal / inputs.avg_loan_amount;
    let annual_origination_unit_goal =
        (annual_closings_unit_goal / inputs.pull_through_rate).floor();
    let annual_origination_dollar_goal = inputs.avg_loan_amount * annual_origination_unit_goal;

    let monthly_units_goal = annual_origination_unit_goal / MONTHS_PER_YEAR;
    let weekly_units_goal = (annual_origination_unit_goal / WEEKS_PER_YEAR).ceil();
    let daily_units_goal = (weekly_units_goal / WORKDAYS_PER_WEEK).ceil();

    let daily_referred_pre_quals = (daily_units_goal / inputs.conversion_to_app).ceil();
    let monthly_referred_pre_quals =
        (daily_referred_pre_quals * WORKDAYS_PER_WEEK * WEEKS_PER_YEAR / MONTHS_PER_YEAR).ceil();
    let min_pre_qual_per_partner =
        monthly_referred_pre_quals / f64::from(inputs.total_referral_partners);

    SimplifiedPlan {
        annual_closings_unit_goal,
        annual_origination_unit_goal,
        annual_origination_dollar_goal,
        monthly_units_goal,
        weekly_units_goal,
        daily_units_goal,
        daily_referred_pre_quals,
        monthly_referred_pre_quals,
        min_pre_qual_per_partner,
    }
}

pub fn high_trust_plan(inputs: &GoalInputs) -> HighTrustPlan {
    let target_closings_dollar_goal =
        inputs.annual_income_goal / inputs.avg_commission_basis_points;
    let target_closings_unit_goal = target_closings_dollar_goal / inputs.avg_loan_amount;
    let annual_origination_unit_goal = target_closings_unit_goal / inputs.pull_through_rate;
    let annual_origination_dollar_goal = inputs.avg_loan_amount * annual_origination_unit_goal;

    let monthly_units_goal = annual_origination_unit_goal / MONTHS_PER_YEAR;
    let weekly_units_goal = annual_origination_unit_goal / WEEKS_PER_YEAR;
    let daily_units_goal = weekly_units_goal / WORKDAYS_PER_WEEK;

    let daily_pre_quals = daily_units_goal / inputs.pre_qual_to_app_rate;
    let monthly_pre_quals = daily_pre_quals * WORKDAYS_PER_WEEK * WEEKS_PER_YEAR / MONTHS_PER_YEAR;
    let min_pre_qual_per_partner = monthly_pre_quals / f64::from(inputs.total_referral_partners);

    HighTrustPlan {
        target_closings_dollar_goal,
        target_closings_unit_goal,
        annual_origination_unit_goal,
        annual_origination_dollar_goal,
        monthly_units_goal,
        weekly_units_goal,
        daily_units_goal,
        daily_pre_quals,
        monthly_pre_quals,
        min_pre_qual_per_partner,
    }
}

// serde_json writes non-finite floats as null.
fn f64_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}
