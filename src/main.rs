use amortize::loan::*;
use chrono::NaiveDate;
use log::info;
use rust_decimal_macros::dec;
use simple_logger::SimpleLogger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let terms = LoanTerms::new(
        dec!(100000),
        dec!(10),
        12,
        NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid start date")?,
    );
    let part_payments = [PartPayment::new(
        dec!(20000),
        NaiveDate::from_ymd_opt(2024, 6, 15).ok_or("invalid part payment date")?,
    )];

    let original = compute_schedule(&terms, &[])?;
    let revised = compute_schedule(&terms, &part_payments)?;

    println!("{}", revised);
    info!(
        "part payment saves ${:.2} of interest",
        round_money(original.total_interest - revised.total_interest)
    );
    Ok(())
}

#[cfg(test)]
// verifies that the value types can be shared across request handlers
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<LoanTerms>();
    is_normal::<PartPayment>();
    is_normal::<PeriodRecord>();
    is_normal::<Schedule>();
}
