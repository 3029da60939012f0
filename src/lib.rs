pub mod daycount;
pub mod error;
pub mod loan;

pub use daycount::DayCount;
pub use error::{ScheduleError, ScheduleResult};
pub use loan::{
    compute_schedule, compute_schedule_with, LoanTerms, PartPayment, PeriodKind, PeriodRecord,
    Recalculation, Schedule, ScheduleOptions, SplitAccrual,
};
