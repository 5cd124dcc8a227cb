use crate::errors::ChimeErrors;
use crate::utils::millis_to_date_time;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// [`CronEvaluator`] is a pure evaluation facade over the standard cron
/// grammar (minute, hour, day-of-month, month, day-of-week, with an optional
/// leading seconds field) including lists, ranges, steps and wildcards.
/// Learn more about cron expressions in
/// [Wikipedia](https://en.wikipedia.org/wiki/Cron)
///
/// # Implementation Detail(s)
/// Under the hood, this uses the crate ``cron`` to parse the expression and
/// iterate upcoming occurrences. Five-field expressions are normalized by
/// prepending a zero seconds field, six-field (seconds-precision) and
/// seven-field (with years) expressions pass through unchanged
///
/// # Usage Note(s)
/// Evaluation is strictly advancing: when the ``from`` instant lands exactly
/// on a valid fire instant, the next computed time is strictly greater, a
/// schedule can never re-fire on the instant it just fired at
///
/// # Examples
/// ```ignore
/// use chime::cron::CronEvaluator;
///
/// // At 12:00 (noon) every day
/// assert!(CronEvaluator::is_valid("0 12 * * *"));
///
/// // Every 5 minutes
/// let next = CronEvaluator::first_run_after("*/5 * * * *", 0)?;
/// assert!(next.is_some());
/// ```
///
/// # See Also
/// - [`Schedule`](crate::schedule::Schedule)
/// - [`Recurrence`](crate::schedule::Recurrence)
pub struct CronEvaluator;

impl CronEvaluator {
    /// Checks whether ``expression`` parses against the supported cron
    /// grammar, creation-time validation goes through this
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// Computes the first fire instant strictly after ``from_millis``
    /// (milliseconds since the UNIX epoch)
    ///
    /// # Returns
    /// ``Ok(None)`` when the expression can never fire again (e.g. a fixed
    /// past date with no recurrence), otherwise ``Ok(Some(millis))`` with the
    /// computed instant. Fails with [`ChimeErrors::InvalidCronExpression`]
    /// when the expression doesn't parse
    pub fn first_run_after(expression: &str, from_millis: u64) -> Result<Option<u64>, ChimeErrors> {
        let schedule = Self::parse(expression)?;
        // the iterator is already strictly advancing, an instant landing
        // exactly on a fire time yields the following one
        let from = millis_to_date_time(from_millis);
        Ok(schedule
            .after(&from)
            .next()
            .map(|next| next.timestamp_millis() as u64))
    }

    fn parse(expression: &str) -> Result<CronSchedule, ChimeErrors> {
        let fields = expression.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {expression}"),
            6 | 7 => expression.to_owned(),
            n => {
                return Err(ChimeErrors::InvalidCronExpression(
                    expression.to_owned(),
                    format!("expected 5, 6 or 7 fields, found {n}"),
                ));
            }
        };
        CronSchedule::from_str(&normalized).map_err(|err| {
            ChimeErrors::InvalidCronExpression(expression.to_owned(), err.to_string())
        })
    }
}
