//! Row store shared by every service.
//!
//! All tables live in memory behind one [`RwLock`]. Writes go through
//! [`Database::write`]: the closure reads a consistent snapshot and stages rows on a
//! [`Transaction`]; staged rows are persisted and applied only if the closure returns `Ok`.
//! A write that fails halfway therefore leaves neither memory nor disk partially updated.
//!
//! Holding the write lock for the whole closure makes read-check-insert sequences (unique
//! patient fields, payment attempt counting) atomic within one process.

mod persistence;
mod table;

pub use table::{Row, Table};

use crate::repositories::applications::Application;
use crate::repositories::billing::{Payment, PaymentAttempt};
use crate::repositories::directory::{Doctor, Hospital, User};
use crate::repositories::patients::Patient;
use crate::repositories::records::Record;
use crate::{CardioError, CardioResult};
use cardio_uuid::{TimestampId, TimestampIdGenerator};
use chrono::{DateTime, Utc};
use persistence::{PendingWrite, Persistence};
use std::path::Path;
use std::sync::RwLock;

/// Every table the platform keeps.
#[derive(Debug, Default)]
pub struct Tables {
    pub applications: Table<Application>,
    pub hospitals: Table<Hospital>,
    pub doctors: Table<Doctor>,
    pub users: Table<User>,
    pub patients: Table<Patient>,
    pub records: Table<Record>,
    pub payments: Table<Payment>,
    pub payment_attempts: Table<PaymentAttempt>,
}

macro_rules! mutations {
    ($($variant:ident => $table:ident),* $(,)?) => {
        /// A staged insert or replace of one row.
        #[derive(Debug, Clone)]
        pub enum Mutation {
            $($variant($variant),)*
        }

        $(
            impl From<$variant> for Mutation {
                fn from(row: $variant) -> Self {
                    Mutation::$variant(row)
                }
            }
        )*

        impl Mutation {
            fn encode(&self, persistence: &Persistence) -> CardioResult<PendingWrite> {
                match self {
                    $(Mutation::$variant(row) => persistence.encode(row),)*
                }
            }

            fn apply(self, tables: &mut Tables) {
                match self {
                    $(Mutation::$variant(row) => tables.$table.upsert(row),)*
                }
            }
        }

        fn load_tables(persistence: &Persistence) -> CardioResult<Tables> {
            Ok(Tables {
                $($table: Table::from_rows(persistence.load::<$variant>()?),)*
            })
        }
    };
}

mutations! {
    Application => applications,
    Hospital => hospitals,
    Doctor => doctors,
    User => users,
    Patient => patients,
    Record => records,
    Payment => payments,
    PaymentAttempt => payment_attempts,
}

/// A write in progress.
#[derive(Debug)]
pub struct Transaction<'a> {
    tables: &'a Tables,
    staged: Vec<Mutation>,
}

impl<'a> Transaction<'a> {
    /// Snapshot as of the start of the transaction; staged rows are not visible here.
    pub fn tables(&self) -> &'a Tables {
        self.tables
    }

    /// Stages an insert, or a full replacement of the row with the same key.
    pub fn put(&mut self, row: impl Into<Mutation>) {
        self.staged.push(row.into());
    }
}

#[derive(Debug)]
pub struct Database {
    tables: RwLock<Tables>,
    persistence: Option<Persistence>,
    log_ids: TimestampIdGenerator,
}

impl Database {
    /// A database that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            persistence: None,
            log_ids: TimestampIdGenerator::new(),
        }
    }

    /// Opens (creating if needed) the tables under `data_dir` and loads every row.
    pub fn open(data_dir: &Path) -> CardioResult<Self> {
        let persistence = Persistence::open(data_dir)?;
        let tables = load_tables(&persistence)?;

        let newest_log_id = tables
            .records
            .iter()
            .map(|r| r.id.timestamp_id())
            .chain(tables.payments.iter().map(|p| p.id.timestamp_id()))
            .chain(tables.payment_attempts.iter().map(|a| a.id.timestamp_id()))
            .max();

        tracing::info!(
            data_dir = %data_dir.display(),
            applications = tables.applications.len(),
            hospitals = tables.hospitals.len(),
            patients = tables.patients.len(),
            records = tables.records.len(),
            payments = tables.payments.len(),
            "opened database"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            persistence: Some(persistence),
            log_ids: TimestampIdGenerator::starting_after(newest_log_id),
        })
    }

    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> CardioResult<R> {
        let guard = self.tables.read().map_err(|_| CardioError::LockPoisoned)?;
        Ok(f(&guard))
    }

    /// Runs `f` under the write lock and commits what it staged.
    ///
    /// # Errors
    ///
    /// Returns the closure's error unchanged (nothing is committed), or a storage error if the
    /// staged rows could not be persisted (nothing is applied in memory either).
    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> CardioResult<R>,
    ) -> CardioResult<R> {
        let mut guard = self.tables.write().map_err(|_| CardioError::LockPoisoned)?;

        let (result, staged) = {
            let mut tx = Transaction {
                tables: &*guard,
                staged: Vec::new(),
            };
            let result = f(&mut tx)?;
            (result, tx.staged)
        };

        if let Some(persistence) = &self.persistence {
            let batch = staged
                .iter()
                .map(|m| m.encode(persistence))
                .collect::<CardioResult<Vec<_>>>()?;
            persistence.write_batch(&batch)?;
        }

        for mutation in staged {
            mutation.apply(&mut guard);
        }
        Ok(result)
    }

    /// Next identifier for an append-only log; strictly increasing across all logs.
    pub(crate) fn next_log_id(&self, now: DateTime<Utc>) -> TimestampId {
        self.log_ids.next(now)
    }
}
