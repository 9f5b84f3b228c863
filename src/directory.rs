use std::io;
use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{Ms, MINUTE_MS};

/// One entry in the repair-task catalog. The catalog is an external
/// collaborator: the engine only ever reads estimated durations from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub estimated_minutes: u32,
}

impl TaskSpec {
    pub fn estimated_ms(&self) -> Ms {
        self.estimated_minutes as Ms * MINUTE_MS
    }
}

#[derive(Default)]
pub struct RepairTaskCatalog {
    tasks: DashMap<Ulid, TaskSpec>,
}

impl RepairTaskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, id: Ulid, spec: TaskSpec) {
        self.tasks.insert(id, spec);
    }

    pub fn get(&self, id: &Ulid) -> Option<TaskSpec> {
        self.tasks.get(id).map(|e| e.value().clone())
    }

    /// Total estimated duration for an ordered task list. Fails on the
    /// first unknown reference.
    pub fn estimated_total_ms(&self, task_ids: &[Ulid]) -> Result<Ms, EngineError> {
        let mut total = 0;
        for id in task_ids {
            let spec = self.tasks.get(id).ok_or(EngineError::UnknownTask(*id))?;
            total += spec.estimated_ms();
        }
        Ok(total)
    }
}

/// Display-name lookups for the opaque identifiers a work order carries.
/// The engine stores only ids; names are presentation concerns.
#[derive(Default)]
pub struct Directory {
    customers: DashMap<Ulid, String>,
    vehicles: DashMap<Ulid, String>,
    employees: DashMap<Ulid, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_customer(&self, id: Ulid, name: String) {
        self.customers.insert(id, name);
    }

    pub fn upsert_vehicle(&self, id: Ulid, name: String) {
        self.vehicles.insert(id, name);
    }

    pub fn upsert_employee(&self, id: Ulid, name: String) {
        self.employees.insert(id, name);
    }

    pub fn customer_name(&self, id: &Ulid) -> Option<String> {
        self.customers.get(id).map(|e| e.value().clone())
    }

    pub fn vehicle_name(&self, id: &Ulid) -> Option<String> {
        self.vehicles.get(id).map(|e| e.value().clone())
    }

    pub fn employee_name(&self, id: &Ulid) -> Option<String> {
        self.employees.get(id).map(|e| e.value().clone())
    }
}

/// JSON seed file loaded at startup: catalog entries plus directory names.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub tasks: Vec<SeedTask>,
    #[serde(default)]
    pub customers: Vec<SeedName>,
    #[serde(default)]
    pub vehicles: Vec<SeedName>,
    #[serde(default)]
    pub employees: Vec<SeedName>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedTask {
    pub id: Ulid,
    pub name: String,
    pub estimated_minutes: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedName {
    pub id: Ulid,
    pub name: String,
}

pub fn load_seed(
    path: &Path,
    catalog: &RepairTaskCatalog,
    directory: &Directory,
) -> io::Result<()> {
    let data = std::fs::read_to_string(path)?;
    let seed: SeedFile = serde_json::from_str(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    for t in seed.tasks {
        catalog.upsert(
            t.id,
            TaskSpec {
                name: t.name,
                estimated_minutes: t.estimated_minutes,
            },
        );
    }
    for c in seed.customers {
        directory.upsert_customer(c.id, c.name);
    }
    for v in seed.vehicles {
        directory.upsert_vehicle(v.id, v.name);
    }
    for e in seed.employees {
        directory.upsert_employee(e.id, e.name);
    }
    Ok(())
}
