use chrono::{Months, NaiveDate};
use log::{debug, trace, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::daycount::DayCount;
use crate::error::{ScheduleError, ScheduleResult};

/// Longest term the engine will lay out (100 years of monthly installments).
pub const MAX_TERM_MONTHS: u32 = 1200;

// a part payment this close to the outstanding amount settles the loan
const PAYOFF_TOLERANCE: Decimal = dec!(0.005);

/// What changes after a part payment: the installment or the number of installments.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Recalculation {
    /// Recompute the installment over the remaining term. The payoff date stays put.
    #[default]
    KeepTenor,
    /// Keep paying the same installment. The loan pays off sooner.
    KeepInstallment,
}

/// How interest accrues on the sub-periods of a month split by part payments.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SplitAccrual {
    /// Annual rate times the day-count year fraction, on the whole balance.
    /// Interest accrued up to a part payment is added to the balance and
    /// earns interest for the rest of the month.
    ///
    /// A year fraction is not a twelfth of a year, so in a 31-day month a
    /// small part payment can cost more interest than it saves.
    #[default]
    ActualDays,
    /// Monthly rate, shared out over the month by days, on the balance net of
    /// interest already accrued this month. The sub-periods of a month add up
    /// to exactly one regular month, so any part payment lowers total interest.
    MonthlyProRata,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduleOptions {
    pub recalculation: Recalculation,
    /// basis for interest on sub-periods split by a part payment
    pub day_count: DayCount,
    pub split_accrual: SplitAccrual,
}

impl ScheduleOptions {
    pub fn new(recalculation: Recalculation, day_count: DayCount) -> Self {
        Self {
            recalculation,
            day_count,
            split_accrual: SplitAccrual::default(),
        }
    }

    pub fn with_split_accrual(self, split_accrual: SplitAccrual) -> Self {
        Self {
            split_accrual,
            ..self
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoanTerms {
    pub principal: Decimal,
    /// annual rate as a percentage, i.e. 10 for 10%
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub start_date: NaiveDate,
}

impl LoanTerms {
    pub fn new(
        principal: Decimal,
        annual_rate: Decimal,
        term_months: u32,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            principal,
            annual_rate,
            term_months,
            start_date,
        }
    }

    pub fn from_years(
        principal: Decimal,
        annual_rate: Decimal,
        term_years: u32,
        start_date: NaiveDate,
    ) -> ScheduleResult<Self> {
        let term_months = term_years.checked_mul(12).ok_or_else(|| {
            ScheduleError::invalid(
                "term_years",
                format!("{} years does not fit in a month count", term_years),
            )
        })?;
        Ok(Self::new(principal, annual_rate, term_months, start_date))
    }

    pub fn validate(&self) -> ScheduleResult<()> {
        if self.principal <= Decimal::ZERO {
            return Err(ScheduleError::invalid(
                "principal",
                format!("must be greater than zero, got {}", self.principal),
            ));
        }
        if self.annual_rate < Decimal::ZERO {
            return Err(ScheduleError::invalid(
                "annual_rate",
                format!("must not be negative, got {}", self.annual_rate),
            ));
        }
        if self.term_months == 0 || self.term_months > MAX_TERM_MONTHS {
            return Err(ScheduleError::invalid(
                "term_months",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_TERM_MONTHS, self.term_months
                ),
            ));
        }
        Ok(())
    }

    /// Date of the last installment on the original schedule.
    pub fn maturity_date(&self) -> ScheduleResult<NaiveDate> {
        installment_date(self.start_date, self.term_months)
    }

    fn monthly_rate(&self) -> Decimal {
        self.annual_rate / dec!(1200)
    }

    fn yearly_rate(&self) -> Decimal {
        self.annual_rate / dec!(100)
    }
}

/// An extra principal payment made on `date`, outside the installment schedule.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartPayment {
    pub amount: Decimal,
    pub date: NaiveDate,
}

impl PartPayment {
    pub fn new(amount: Decimal, date: NaiveDate) -> Self {
        Self { amount, date }
    }

    fn validate(&self, terms: &LoanTerms) -> ScheduleResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(ScheduleError::invalid(
                "part_payments",
                format!(
                    "amount must be greater than zero, got {} on {}",
                    self.amount, self.date
                ),
            ));
        }
        if self.date <= terms.start_date {
            return Err(ScheduleError::invalid(
                "part_payments",
                format!(
                    "date {} must be after the loan start date {}",
                    self.date, terms.start_date
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PeriodKind {
    /// a whole month, interest at the monthly rate
    Regular,
    /// sub-period ending on a part payment date
    PartPayment,
    /// sub-period from the last part payment to the installment date
    Stub,
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodKind::Regular => "regular",
            PeriodKind::PartPayment => "part payment",
            PeriodKind::Stub => "stub",
        };
        write!(f, "{}", name)
    }
}

/// One row of the schedule.
///
/// Amounts are carried at full precision; `closing_balance` always equals
/// `opening_balance + interest - installment - part_payment`. On a
/// `PartPayment` sub-period no installment is due, the accrued interest is
/// added to the balance, and `principal_portion` is therefore negative.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeriodRecord {
    pub period_index: u32,
    pub kind: PeriodKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: i64,
    pub opening_balance: Decimal,
    pub interest: Decimal,
    pub installment: Decimal,
    pub principal_portion: Decimal,
    pub part_payment: Decimal,
    pub closing_balance: Decimal,
}

impl PeriodRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        period_index: u32,
        kind: PeriodKind,
        start_date: NaiveDate,
        end_date: NaiveDate,
        opening_balance: Decimal,
        interest: Decimal,
        installment: Decimal,
        part_payment: Decimal,
        closing_balance: Decimal,
    ) -> Self {
        Self {
            period_index,
            kind,
            start_date,
            end_date,
            day_count: end_date.signed_duration_since(start_date).num_days(),
            opening_balance,
            interest,
            installment,
            principal_portion: installment - interest,
            part_payment,
            closing_balance,
        }
    }

    /// Copy with every amount rounded to cents, for display.
    pub fn rounded(&self) -> Self {
        Self {
            opening_balance: round_money(self.opening_balance),
            interest: round_money(self.interest),
            installment: round_money(self.installment),
            principal_portion: round_money(self.principal_portion),
            part_payment: round_money(self.part_payment),
            closing_balance: round_money(self.closing_balance),
            ..self.clone()
        }
    }
}

impl fmt::Display for PeriodRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period {}", self.period_index)?;
        if self.kind != PeriodKind::Regular {
            write!(f, " ({})", self.kind)?;
        }
        write!(
            f,
            ", {} to {} ({} days), opening ${:.2}, interest ${:.2}, installment ${:.2}, principal ${:.2}, part payment ${:.2}, closing ${:.2}",
            self.start_date,
            self.end_date,
            self.day_count,
            round_money(self.opening_balance),
            round_money(self.interest),
            round_money(self.installment),
            round_money(self.principal_portion),
            round_money(self.part_payment),
            round_money(self.closing_balance)
        )
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schedule {
    pub periods: Vec<PeriodRecord>,
    pub initial_installment: Decimal,
    pub total_interest: Decimal,
    pub total_principal: Decimal,
    pub total_part_payments: Decimal,
    pub total_paid: Decimal,
    /// number of installment dates actually needed
    pub installment_count: u32,
    pub original_payoff_date: NaiveDate,
    pub revised_payoff_date: NaiveDate,
}

impl Schedule {
    fn new(
        periods: Vec<PeriodRecord>,
        initial_installment: Decimal,
        terms: &LoanTerms,
    ) -> ScheduleResult<Self> {
        let mut total_interest = Decimal::ZERO;
        let mut total_principal = Decimal::ZERO;
        let mut total_part_payments = Decimal::ZERO;
        let mut total_installments = Decimal::ZERO;
        let mut installment_count = 0;

        for period in &periods {
            total_interest = checked(
                total_interest.checked_add(period.interest),
                "total interest",
            )?;
            total_principal = checked(
                total_principal.checked_add(period.principal_portion),
                "total principal",
            )?;
            total_part_payments = checked(
                total_part_payments.checked_add(period.part_payment),
                "total part payments",
            )?;
            total_installments = checked(
                total_installments.checked_add(period.installment),
                "total installments",
            )?;
            if period.kind != PeriodKind::PartPayment {
                installment_count += 1;
            }
        }

        Ok(Self {
            initial_installment,
            total_interest,
            total_principal,
            total_part_payments,
            total_paid: checked(
                total_installments.checked_add(total_part_payments),
                "total paid",
            )?,
            installment_count,
            original_payoff_date: terms.maturity_date()?,
            revised_payoff_date: periods
                .last()
                .map(|period| period.end_date)
                .unwrap_or(terms.start_date),
            periods,
        })
    }

    pub fn final_balance(&self) -> Decimal {
        self.periods
            .last()
            .map(|period| period.closing_balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Copy with every amount rounded to cents, for display.
    pub fn rounded(&self) -> Self {
        Self {
            periods: self.periods.iter().map(PeriodRecord::rounded).collect(),
            initial_installment: round_money(self.initial_installment),
            total_interest: round_money(self.total_interest),
            total_principal: round_money(self.total_principal),
            total_part_payments: round_money(self.total_part_payments),
            total_paid: round_money(self.total_paid),
            ..self.clone()
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for period in &self.periods {
            writeln!(f, "{}", period)?;
        }
        write!(
            f,
            "installments {}, total interest ${:.2}, total paid ${:.2}, payoff {} (originally {})",
            self.installment_count,
            round_money(self.total_interest),
            round_money(self.total_paid),
            self.revised_payoff_date,
            self.original_payoff_date
        )
    }
}

/// Rounds a money amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Date of installment `n`, counted in whole months from `start`.
///
/// Each date is anchored on `start` rather than on the previous installment,
/// so a loan started on the 31st pays on the last day of shorter months
/// without drifting to the 28th for the rest of the term.
pub fn installment_date(start: NaiveDate, n: u32) -> ScheduleResult<NaiveDate> {
    start.checked_add_months(Months::new(n)).ok_or_else(|| {
        ScheduleError::overflow(format!("installment {} date after {}", n, start))
    })
}

/// Level installment that amortizes `balance` over `periods` at `monthly_rate`:
/// `balance * r / (1 - (1 + r)^-n)`.
///
/// The discount factor `(1 + r)^-n` only shrinks, so long terms at high rates
/// stay in range. Once it rounds to zero the installment is the interest alone.
pub fn annuity_installment(
    balance: Decimal,
    monthly_rate: Decimal,
    periods: u32,
) -> ScheduleResult<Decimal> {
    if periods == 0 {
        return Err(ScheduleError::invalid(
            "periods",
            "an installment needs at least one period",
        ));
    }
    if monthly_rate.is_zero() {
        return checked(balance.checked_div(Decimal::from(periods)), "installment");
    }

    let step = checked(Decimal::ONE.checked_add(monthly_rate), "annuity discount factor")?;
    let per_period = checked(Decimal::ONE.checked_div(step), "annuity discount factor")?;
    let mut discount = Decimal::ONE;
    for _ in 0..periods {
        discount = checked(discount.checked_mul(per_period), "annuity discount factor")?;
    }
    let amortized = Decimal::ONE - discount;
    if amortized.is_zero() {
        // rate too small to register over this term
        return checked(balance.checked_div(Decimal::from(periods)), "installment");
    }
    let factor = checked(monthly_rate.checked_div(amortized), "annuity factor")?;
    checked(balance.checked_mul(factor), "installment")
}

/// Schedule with the default options: keep the tenor, accrue broken periods on actual/365.
pub fn compute_schedule(
    terms: &LoanTerms,
    part_payments: &[PartPayment],
) -> ScheduleResult<Schedule> {
    compute_schedule_with(terms, part_payments, &ScheduleOptions::default())
}

pub fn compute_schedule_with(
    terms: &LoanTerms,
    part_payments: &[PartPayment],
    options: &ScheduleOptions,
) -> ScheduleResult<Schedule> {
    terms.validate()?;
    let mut pending = merge_part_payments(terms, part_payments)?
        .into_iter()
        .peekable();

    let monthly_rate = terms.monthly_rate();
    let initial_installment =
        annuity_installment(terms.principal, monthly_rate, terms.term_months)?;
    debug!(
        "installment {} over {} months at {}%",
        initial_installment, terms.term_months, terms.annual_rate
    );

    let mut periods: Vec<PeriodRecord> = Vec::new();
    let mut balance = terms.principal;
    let mut installment = initial_installment;

    'schedule: for period_index in 1..=terms.term_months {
        let period_start = installment_date(terms.start_date, period_index - 1)?;
        let period_end = installment_date(terms.start_date, period_index)?;
        let is_final = period_index == terms.term_months;

        // split the month at every part payment that lands strictly inside it
        let mut accrual_start = period_start;
        let mut opening = balance;
        let mut carried = Decimal::ZERO;
        let mut broken = false;
        while let Some(payment) = pending.next_if(|payment| payment.date < period_end) {
            let interest = split_interest(
                options,
                terms,
                opening,
                carried,
                (accrual_start, payment.date),
                (period_start, period_end),
            )?;
            carried = checked(carried.checked_add(interest), "accrued interest")?;
            let outstanding = checked(opening.checked_add(interest), "outstanding balance")?;
            let (applied, closing) = apply_part_payment(&payment, outstanding)?;

            let record = PeriodRecord::new(
                period_index,
                PeriodKind::PartPayment,
                accrual_start,
                payment.date,
                opening,
                interest,
                Decimal::ZERO,
                applied,
                closing,
            );
            trace!("{}", record);
            periods.push(record);

            if closing.is_zero() {
                break 'schedule;
            }
            opening = closing;
            accrual_start = payment.date;
            broken = true;
        }

        let interest = if broken {
            split_interest(
                options,
                terms,
                opening,
                carried,
                (accrual_start, period_end),
                (period_start, period_end),
            )?
        } else {
            checked(opening.checked_mul(monthly_rate), "interest")?
        };
        let due = checked(opening.checked_add(interest), "outstanding balance")?;
        // the last installment absorbs whatever is left
        let paid = if is_final || installment >= due {
            due
        } else {
            installment
        };
        let mut closing = due - paid;

        let mut part_payment = Decimal::ZERO;
        if !closing.is_zero() {
            if let Some(payment) = pending.next_if(|payment| payment.date == period_end) {
                let (applied, rest) = apply_part_payment(&payment, closing)?;
                part_payment = applied;
                closing = rest;
            }
        }

        let record = PeriodRecord::new(
            period_index,
            if broken {
                PeriodKind::Stub
            } else {
                PeriodKind::Regular
            },
            accrual_start,
            period_end,
            opening,
            interest,
            paid,
            part_payment,
            closing,
        );
        trace!("{}", record);
        periods.push(record);

        if closing.is_zero() {
            break;
        }
        if (broken || !part_payment.is_zero())
            && options.recalculation == Recalculation::KeepTenor
        {
            installment =
                annuity_installment(closing, monthly_rate, terms.term_months - period_index)?;
            debug!(
                "installment recomputed to {} for the remaining {} months",
                installment,
                terms.term_months - period_index
            );
        }
        balance = closing;
    }

    for payment in pending {
        warn!(
            "part payment of {} on {} falls on or after payoff and has no effect",
            payment.amount, payment.date
        );
    }

    Schedule::new(periods, initial_installment, terms)
}

// validated, in date order, with same-day payments summed
fn merge_part_payments(
    terms: &LoanTerms,
    part_payments: &[PartPayment],
) -> ScheduleResult<Vec<PartPayment>> {
    for payment in part_payments {
        payment.validate(terms)?;
    }

    let mut sorted = part_payments.to_vec();
    sorted.sort_by_key(|payment| payment.date);

    let mut merged: Vec<PartPayment> = Vec::with_capacity(sorted.len());
    for payment in sorted {
        match merged.last_mut() {
            Some(last) if last.date == payment.date => {
                last.amount = checked(
                    last.amount.checked_add(payment.amount),
                    "part payment total",
                )?;
            }
            _ => merged.push(payment),
        }
    }
    Ok(merged)
}

// interest over `span`, a slice of the installment period `period`;
// `carried` is the interest already accrued earlier in the same period
fn split_interest(
    options: &ScheduleOptions,
    terms: &LoanTerms,
    balance: Decimal,
    carried: Decimal,
    span: (NaiveDate, NaiveDate),
    period: (NaiveDate, NaiveDate),
) -> ScheduleResult<Decimal> {
    let (from, to) = span;
    match options.split_accrual {
        SplitAccrual::ActualDays => {
            let per_year = checked(balance.checked_mul(terms.yearly_rate()), "interest")?;
            checked(
                per_year.checked_mul(options.day_count.year_fraction(from, to)),
                "interest",
            )
        }
        SplitAccrual::MonthlyProRata => {
            let (period_start, period_end) = period;
            let days = Decimal::from(options.day_count.days_between(from, to));
            let period_days =
                Decimal::from(options.day_count.days_between(period_start, period_end));
            let share = checked(days.checked_div(period_days), "interest")?;
            let principal = checked(balance.checked_sub(carried), "interest")?;
            let per_month = checked(principal.checked_mul(terms.monthly_rate()), "interest")?;
            checked(per_month.checked_mul(share), "interest")
        }
    }
}

// returns (amount applied, balance left)
fn apply_part_payment(
    payment: &PartPayment,
    outstanding: Decimal,
) -> ScheduleResult<(Decimal, Decimal)> {
    let remaining = outstanding - payment.amount;
    if remaining < -PAYOFF_TOLERANCE {
        return Err(ScheduleError::invalid(
            "part_payments",
            format!(
                "part payment of {:.2} on {} exceeds the outstanding balance of {:.2}",
                round_money(payment.amount),
                payment.date,
                round_money(outstanding)
            ),
        ));
    }
    if remaining <= PAYOFF_TOLERANCE {
        Ok((outstanding, Decimal::ZERO))
    } else {
        Ok((payment.amount, remaining))
    }
}

fn checked(value: Option<Decimal>, context: &str) -> ScheduleResult<Decimal> {
    value.ok_or_else(|| ScheduleError::overflow(context))
}
