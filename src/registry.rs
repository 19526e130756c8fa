//! Named table registry.
//!
//! Lets independent components share a table by name: one creates it, the
//! others find it. Registries are plain values; there is no process-wide
//! instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Parameters;
use crate::error::Error;
use crate::error::Result;
use crate::params::DefaultParams;
use crate::params::Params;
use crate::public::CuckooHash;
use crate::sync::Mutex;

/// A set of tables keyed by name.
///
/// # Examples
///
/// ```
/// use cuckoo_tab::{Error, Parameters, Registry};
///
/// let registry: Registry = Registry::new();
///
/// let table = registry.create(Parameters::new("arp", 256, 4)).unwrap();
/// let found = registry.find_existing("arp").unwrap();
///
/// found.add(b"10.0").unwrap();
/// assert_eq!(table.count(), 1);
///
/// assert!(matches!(
///   registry.create(Parameters::new("arp", 256, 4)),
///   Err(Error::AlreadyExists(_)),
/// ));
///
/// registry.free("arp").unwrap();
/// assert_eq!(registry.find_existing("arp").unwrap_err(), Error::NotFound);
/// ```
pub struct Registry<P = DefaultParams>
where
  P: Params + ?Sized,
{
  tables: Mutex<HashMap<String, Arc<CuckooHash<P>>>>,
}

impl<P> Registry<P>
where
  P: Params + ?Sized,
{
  pub fn new() -> Self {
    Self {
      tables: Mutex::new(HashMap::new()),
    }
  }

  /// Creates a table and registers it under its name.
  ///
  /// # Errors
  ///
  /// Returns [`Error::AlreadyExists`] if the name is taken, or any error of
  /// [`CuckooHash::new`].
  pub fn create(&self, params: Parameters) -> Result<Arc<CuckooHash<P>>> {
    let mut tables = self.tables.lock();

    if tables.contains_key(params.name()) {
      tracing::error!(name = params.name(), "table already exists");
      return Err(Error::AlreadyExists(params.name().to_owned()));
    }

    let table: Arc<CuckooHash<P>> = Arc::new(CuckooHash::new(params)?);

    tables.insert(table.name().to_owned(), Arc::clone(&table));

    Ok(table)
  }

  /// Returns the table registered under `name`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no such table is registered.
  pub fn find_existing(&self, name: &str) -> Result<Arc<CuckooHash<P>>> {
    self.tables.lock().get(name).cloned().ok_or(Error::NotFound)
  }

  /// Unregisters the table named `name`.
  ///
  /// The table itself is dropped once every outstanding handle is gone.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no such table is registered.
  pub fn free(&self, name: &str) -> Result<()> {
    let table: Arc<CuckooHash<P>> = self.tables.lock().remove(name).ok_or(Error::NotFound)?;

    tracing::debug!(
      name,
      handles = Arc::strong_count(&table) - 1,
      "freed table",
    );

    Ok(())
  }

  /// Returns the number of registered tables.
  pub fn len(&self) -> usize {
    self.tables.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<P> Default for Registry<P>
where
  P: Params + ?Sized,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
