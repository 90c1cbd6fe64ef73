//! Functional Patterns for the Service Layer
//!
//! Store work is described as a [`QueryReader`] and only executed once a
//! connection is available, which keeps services free of pool handling and
//! lets controllers move the blocking part onto the blocking thread pool.
//! Input checks are composed from small rules with [`Validator`].

use diesel::Connection as _;

use crate::{
    config::db::{Connection, Pool},
    error::{ServiceError, ServiceResult},
};

/// A unit of store work, run later against whatever connection the caller
/// checks out of the pool.
pub struct QueryReader<T> {
    run: Box<dyn Fn(&mut Connection) -> ServiceResult<T> + Send + Sync>,
}

impl<T> QueryReader<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Connection) -> ServiceResult<T> + Send + Sync + 'static,
    {
        Self { run: Box::new(f) }
    }

    pub fn run(&self, conn: &mut Connection) -> ServiceResult<T> {
        (self.run)(conn)
    }

    /// Post-process the rows once the query has run.
    pub fn map<U, F>(self, f: F) -> QueryReader<U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
        T: 'static,
    {
        QueryReader::new(move |conn| self.run(conn).map(&f))
    }

    /// Wrap the work in a SQLite transaction. A failure rolls back and is
    /// returned as is.
    pub fn transaction(self) -> QueryReader<T>
    where
        T: 'static,
    {
        QueryReader::new(move |conn| {
            conn.transaction::<T, ServiceError, _>(|conn| {
                self.run(conn).map_err(|e| {
                    log::warn!("Rolling back entry transaction: {}", e);
                    e
                })
            })
        })
    }
}

/// Check out a connection and run `reader` on it. Blocking.
pub fn run_query<T>(reader: QueryReader<T>, pool: &Pool) -> ServiceResult<T> {
    pool.get()
        .map_err(|e| {
            ServiceError::storage(format!("Failed to get database connection: {}", e))
                .with_tag("database")
        })
        .and_then(|mut conn| reader.run(&mut conn))
}

type Rule<T> = Box<dyn Fn(&T) -> ServiceResult<()> + Send + Sync>;

/// Ordered list of checks over a payload; the first failing check decides the error.
pub struct Validator<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Validator<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&T) -> ServiceResult<()> + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
        self
    }

    /// Apply `check` to the part of the payload selected by `project`.
    pub fn field<V, P, C>(self, project: P, check: C) -> Self
    where
        P: Fn(&T) -> &V + Send + Sync + 'static,
        C: Fn(&V) -> ServiceResult<()> + Send + Sync + 'static,
        V: ?Sized,
    {
        self.rule(move |input: &T| check(project(input)))
    }

    pub fn validate(&self, input: &T) -> ServiceResult<()> {
        self.rules.iter().try_for_each(|rule| rule(input))
    }
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks shared by the numeric entry columns.
pub mod validation_rules {
    use super::{ServiceError, ServiceResult};

    pub fn finite(field_name: &'static str) -> impl Fn(&Option<f64>) -> ServiceResult<()> {
        move |value: &Option<f64>| match value {
            Some(n) if !n.is_finite() => Err(ServiceError::bad_request(format!(
                "{} must be a finite number",
                field_name
            ))),
            _ => Ok(()),
        }
    }

    pub fn non_negative(field_name: &'static str) -> impl Fn(&Option<f64>) -> ServiceResult<()> {
        move |value: &Option<f64>| match value {
            Some(n) if *n < 0.0 => Err(ServiceError::bad_request(format!(
                "{} must not be negative",
                field_name
            ))),
            _ => Ok(()),
        }
    }
}

/// Logs a failed result under `operation` and hands it on unchanged.
pub trait FunctionalErrorHandling<T> {
    fn log_error(self, operation: &str) -> ServiceResult<T>;
}

impl<T> FunctionalErrorHandling<T> for ServiceResult<T> {
    fn log_error(self, operation: &str) -> ServiceResult<T> {
        if let Err(e) = &self {
            log::error!("{} failed: {}", operation, e);
        }
        self
    }
}
