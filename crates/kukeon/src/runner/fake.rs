//! An in-memory [`Runner`] used by the controller test suite.
//!
//! The fake keeps entities, cgroups, namespaces, networks and container
//! tasks in plain maps behind a mutex, journals every port operation as
//! `"op:target"` so tests can assert exactly which operations an entry point
//! touched, and supports one-shot failure injection per operation.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    constants::DEFAULT_RUN_PATH,
    error::{Error, Result},
    model::{Cell, CgroupScope, Container, Realm, Space, Stack, State},
    naming,
    runner::{CniBootstrapReport, CniDirectories, Runner},
};

#[derive(Default)]
struct FakeState {
    realms: BTreeMap<String, Realm>,
    spaces: BTreeMap<String, Space>,
    stacks: BTreeMap<String, Stack>,
    cells: BTreeMap<String, Cell>,
    cgroups: BTreeSet<String>,
    namespaces: BTreeSet<String>,
    networks: BTreeSet<String>,
    root_containers: BTreeSet<String>,
    tasks: BTreeSet<String>,
    orphaned_tasks: BTreeSet<String>,
    cni_residue: BTreeSet<String>,
    cni_dirs: BTreeSet<PathBuf>,
    calls: Vec<String>,
    failures: BTreeMap<String, String>,
    close_count: usize,
}

pub struct FakeRunner {
    run_path: PathBuf,
    state: Mutex<FakeState>,
}

fn space_key(realm: &str, space: &str) -> String {
    format!("{realm}/{space}")
}

fn stack_key(realm: &str, space: &str, stack: &str) -> String {
    format!("{realm}/{space}/{stack}")
}

fn cell_key(realm: &str, space: &str, stack: &str, cell: &str) -> String {
    format!("{realm}/{space}/{stack}/{cell}")
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::with_run_path(DEFAULT_RUN_PATH)
    }

    pub fn with_run_path(run_path: impl Into<PathBuf>) -> Self {
        Self {
            run_path: run_path.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake runner state mutex poisoned")
    }

    fn record(&self, op: &str, target: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("{op}:{target}"));
        if let Some(message) = state.failures.remove(op) {
            return Err(Error::RunnerFailure {
                operation: op.to_string(),
                message,
            });
        }
        Ok(())
    }

    /// Makes the next invocation of `op` fail with `RunnerFailure(message)`.
    pub fn fail_next(&self, op: &str, message: &str) {
        self.state()
            .failures
            .insert(op.to_string(), message.to_string());
    }

    /// The journal of `"op:target"` records, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// How often the given operation was invoked, regardless of target.
    pub fn call_count(&self, op: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|entry| entry.split(':').next() == Some(op))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    // Seeding: materialize entities (metadata plus runtime resources)
    // without touching the call journal, so tests can arrange pre-state.

    pub fn seed_realm(&self, realm: Realm) {
        let mut state = self.state();
        if let Ok(path) = naming::realm_cgroup_path(&realm.metadata.name) {
            state.cgroups.insert(path);
        }
        state.namespaces.insert(realm.spec.namespace.clone());
        state.realms.insert(realm.metadata.name.clone(), realm);
    }

    pub fn seed_space(&self, space: Space) {
        let mut state = self.state();
        if let Ok(path) = naming::space_cgroup_path(&space.spec.realm_name, &space.metadata.name) {
            state.cgroups.insert(path);
        }
        if let Ok(network) =
            naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)
        {
            state.networks.insert(network);
        }
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        state.spaces.insert(key, space);
    }

    pub fn seed_stack(&self, stack: Stack) {
        let mut state = self.state();
        if let Ok(path) = naming::stack_cgroup_path(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        ) {
            state.cgroups.insert(path);
        }
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        state.stacks.insert(key, stack);
    }

    pub fn seed_cell(&self, cell: Cell) {
        let mut state = self.state();
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        if let Ok(path) = naming::cell_cgroup_path(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        ) {
            state.cgroups.insert(path);
        }
        state.root_containers.insert(key.clone());
        for container in &cell.status.containers {
            if !container.state.is_running() {
                continue;
            }
            if let Ok(task) = naming::build_container_name(
                &cell.spec.realm_name,
                &cell.spec.space_name,
                &cell.metadata.name,
                &container.name,
            ) {
                state.tasks.insert(task);
            }
        }
        state.cells.insert(key, cell);
    }

    /// Simulates drift: removes a cgroup out from under the metadata.
    pub fn remove_cgroup(&self, path: &str) {
        self.state().cgroups.remove(path);
    }

    pub fn remove_namespace(&self, namespace: &str) {
        self.state().namespaces.remove(namespace);
    }

    pub fn remove_network(&self, network: &str) {
        self.state().networks.remove(network);
    }

    pub fn remove_task(&self, task: &str) {
        self.state().tasks.remove(task);
    }

    /// A runtime container with no owning metadata; reaped by purge.
    pub fn add_orphaned_task(&self, task: &str) {
        self.state().orphaned_tasks.insert(task.to_string());
    }

    /// A CNI artefact left behind after its space disappeared.
    pub fn add_cni_residue(&self, network: &str) {
        self.state().cni_residue.insert(network.to_string());
    }

    // Accessors for asserting post-state.

    pub fn realm(&self, name: &str) -> Option<Realm> {
        self.state().realms.get(name).cloned()
    }

    pub fn space(&self, realm: &str, name: &str) -> Option<Space> {
        self.state().spaces.get(&space_key(realm, name)).cloned()
    }

    pub fn stack(&self, realm: &str, space: &str, name: &str) -> Option<Stack> {
        self.state()
            .stacks
            .get(&stack_key(realm, space, name))
            .cloned()
    }

    pub fn cell(&self, realm: &str, space: &str, stack: &str, name: &str) -> Option<Cell> {
        self.state()
            .cells
            .get(&cell_key(realm, space, stack, name))
            .cloned()
    }

    pub fn has_cgroup(&self, path: &str) -> bool {
        self.state().cgroups.contains(path)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state().namespaces.contains(namespace)
    }

    pub fn has_network(&self, network: &str) -> bool {
        self.state().networks.contains(network)
    }

    pub fn has_task(&self, task: &str) -> bool {
        self.state().tasks.contains(task)
    }
}

#[async_trait]
impl Runner for FakeRunner {
    fn run_path(&self) -> &Path {
        &self.run_path
    }

    async fn get_realm(&self, realm: Realm) -> Result<Realm> {
        let name = realm.metadata.name.clone();
        self.record("get_realm", &name)?;
        self.state()
            .realms
            .get(&name)
            .cloned()
            .ok_or(Error::RealmNotFound { name })
    }

    async fn get_space(&self, space: Space) -> Result<Space> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("get_space", &key)?;
        self.state()
            .spaces
            .get(&key)
            .cloned()
            .ok_or(Error::SpaceNotFound {
                name: space.metadata.name,
            })
    }

    async fn get_stack(&self, stack: Stack) -> Result<Stack> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("get_stack", &key)?;
        self.state()
            .stacks
            .get(&key)
            .cloned()
            .ok_or(Error::StackNotFound {
                name: stack.metadata.name,
            })
    }

    async fn get_cell(&self, cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("get_cell", &key)?;
        let state = self.state();
        if let Some(found) = state.cells.get(&key) {
            return Ok(found.clone());
        }
        // A cell of that name persisted under a different stack is still
        // found; the controller compares parent references and reports the
        // mismatch.
        state
            .cells
            .values()
            .find(|candidate| {
                candidate.metadata.name == cell.metadata.name
                    && candidate.spec.realm_name == cell.spec.realm_name
                    && candidate.spec.space_name == cell.spec.space_name
            })
            .cloned()
            .ok_or(Error::CellNotFound {
                name: cell.metadata.name,
            })
    }

    async fn list_realms(&self) -> Result<Vec<Realm>> {
        self.record("list_realms", "*")?;
        Ok(self.state().realms.values().cloned().collect())
    }

    async fn list_spaces(&self, realm: &str) -> Result<Vec<Space>> {
        self.record("list_spaces", if realm.is_empty() { "*" } else { realm })?;
        Ok(self
            .state()
            .spaces
            .values()
            .filter(|space| realm.is_empty() || space.spec.realm_name == realm)
            .cloned()
            .collect())
    }

    async fn list_stacks(&self, realm: &str, space: &str) -> Result<Vec<Stack>> {
        self.record("list_stacks", &space_key(realm, space))?;
        Ok(self
            .state()
            .stacks
            .values()
            .filter(|stack| realm.is_empty() || stack.spec.realm_name == realm)
            .filter(|stack| space.is_empty() || stack.spec.space_name == space)
            .cloned()
            .collect())
    }

    async fn list_cells(&self, realm: &str, space: &str, stack: &str) -> Result<Vec<Cell>> {
        self.record("list_cells", &stack_key(realm, space, stack))?;
        Ok(self
            .state()
            .cells
            .values()
            .filter(|cell| realm.is_empty() || cell.spec.realm_name == realm)
            .filter(|cell| space.is_empty() || cell.spec.space_name == space)
            .filter(|cell| stack.is_empty() || cell.spec.stack_name == stack)
            .cloned()
            .collect())
    }

    async fn list_containers(
        &self,
        realm: &str,
        space: &str,
        stack: &str,
        cell: &str,
    ) -> Result<Vec<Container>> {
        self.record("list_containers", &cell_key(realm, space, stack, cell))?;
        let state = self.state();
        let mut containers = Vec::new();
        for owner in state
            .cells
            .values()
            .filter(|candidate| realm.is_empty() || candidate.spec.realm_name == realm)
            .filter(|candidate| space.is_empty() || candidate.spec.space_name == space)
            .filter(|candidate| stack.is_empty() || candidate.spec.stack_name == stack)
            .filter(|candidate| cell.is_empty() || candidate.metadata.name == cell)
        {
            for spec in &owner.spec.containers {
                if let Some(container) = owner.container(&spec.name) {
                    containers.push(container);
                }
            }
        }
        Ok(containers)
    }

    async fn exists_cgroup(&self, scope: CgroupScope) -> Result<bool> {
        let path = match &scope {
            CgroupScope::Realm(realm) => naming::realm_cgroup_path(&realm.metadata.name)?,
            CgroupScope::Space(space) => {
                naming::space_cgroup_path(&space.spec.realm_name, &space.metadata.name)?
            }
            CgroupScope::Stack(stack) => naming::stack_cgroup_path(
                &stack.spec.realm_name,
                &stack.spec.space_name,
                &stack.metadata.name,
            )?,
            CgroupScope::Cell(cell) => naming::cell_cgroup_path(
                &cell.spec.realm_name,
                &cell.spec.space_name,
                &cell.spec.stack_name,
                &cell.metadata.name,
            )?,
        };
        self.record("exists_cgroup", &path)?;
        Ok(self.state().cgroups.contains(&path))
    }

    async fn exists_realm_namespace(&self, namespace: String) -> Result<bool> {
        self.record("exists_realm_namespace", &namespace)?;
        Ok(self.state().namespaces.contains(&namespace))
    }

    async fn exists_space_network(&self, space: Space) -> Result<bool> {
        let network =
            naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)?;
        self.record("exists_space_network", &network)?;
        Ok(self.state().networks.contains(&network))
    }

    async fn exists_cell_root_container(&self, cell: Cell) -> Result<bool> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("exists_cell_root_container", &key)?;
        Ok(self.state().root_containers.contains(&key))
    }

    async fn create_realm(&self, mut realm: Realm) -> Result<Realm> {
        let name = realm.metadata.name.clone();
        self.record("create_realm", &name)?;

        realm.status.cgroup_path = naming::realm_cgroup_path(&name)?;
        realm.status.state = State::Created;

        let mut state = self.state();
        state.cgroups.insert(realm.status.cgroup_path.clone());
        state.realms.insert(name, realm.clone());
        if !state.namespaces.insert(realm.spec.namespace.clone()) {
            return Err(Error::NamespaceAlreadyExists {
                namespace: realm.spec.namespace,
            });
        }
        Ok(realm)
    }

    async fn create_space(&self, mut space: Space) -> Result<Space> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("create_space", &key)?;

        let mut state = self.state();
        if !state.realms.contains_key(&space.spec.realm_name) {
            return Err(Error::RealmNotFound {
                name: space.spec.realm_name,
            });
        }
        if state.spaces.contains_key(&key) {
            return Err(Error::RunnerFailure {
                operation: "create_space".to_string(),
                message: format!("space {key:?} already exists"),
            });
        }

        space.status.cgroup_path =
            naming::space_cgroup_path(&space.spec.realm_name, &space.metadata.name)?;
        space.status.network_name =
            naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)?;
        space.status.state = State::Created;

        state.cgroups.insert(space.status.cgroup_path.clone());
        state.networks.insert(space.status.network_name.clone());
        state.spaces.insert(key, space.clone());
        Ok(space)
    }

    async fn create_stack(&self, mut stack: Stack) -> Result<Stack> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("create_stack", &key)?;

        let mut state = self.state();
        let parent = space_key(&stack.spec.realm_name, &stack.spec.space_name);
        if !state.spaces.contains_key(&parent) {
            return Err(Error::SpaceNotFound {
                name: stack.spec.space_name,
            });
        }
        if state.stacks.contains_key(&key) {
            return Err(Error::RunnerFailure {
                operation: "create_stack".to_string(),
                message: format!("stack {key:?} already exists"),
            });
        }

        stack.status.cgroup_path = naming::stack_cgroup_path(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        )?;
        stack.status.state = State::Created;

        state.cgroups.insert(stack.status.cgroup_path.clone());
        state.stacks.insert(key, stack.clone());
        Ok(stack)
    }

    async fn create_cell(&self, mut cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("create_cell", &key)?;

        let mut state = self.state();
        let parent = stack_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
        );
        if !state.stacks.contains_key(&parent) {
            return Err(Error::StackNotFound {
                name: cell.spec.stack_name,
            });
        }
        if state.cells.contains_key(&key) {
            return Err(Error::RunnerFailure {
                operation: "create_cell".to_string(),
                message: format!("cell {key:?} already exists"),
            });
        }

        cell.status.cgroup_path = naming::cell_cgroup_path(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        )?;
        cell.status.state = State::Created;
        cell.record_container_states(State::Created);

        state.cgroups.insert(cell.status.cgroup_path.clone());
        state.root_containers.insert(key.clone());
        state.cells.insert(key, cell.clone());
        Ok(cell)
    }

    async fn ensure_realm(&self, mut realm: Realm) -> Result<Realm> {
        let name = realm.metadata.name.clone();
        self.record("ensure_realm", &name)?;

        realm.status.cgroup_path = naming::realm_cgroup_path(&name)?;
        let mut state = self.state();
        state.cgroups.insert(realm.status.cgroup_path.clone());
        state.namespaces.insert(realm.spec.namespace.clone());
        state.realms.insert(name, realm.clone());
        Ok(realm)
    }

    async fn ensure_space(&self, mut space: Space) -> Result<Space> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("ensure_space", &key)?;

        space.status.cgroup_path =
            naming::space_cgroup_path(&space.spec.realm_name, &space.metadata.name)?;
        space.status.network_name =
            naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)?;
        let mut state = self.state();
        state.cgroups.insert(space.status.cgroup_path.clone());
        state.networks.insert(space.status.network_name.clone());
        state.spaces.insert(key, space.clone());
        Ok(space)
    }

    async fn ensure_stack(&self, mut stack: Stack) -> Result<Stack> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("ensure_stack", &key)?;

        stack.status.cgroup_path = naming::stack_cgroup_path(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        )?;
        let mut state = self.state();
        state.cgroups.insert(stack.status.cgroup_path.clone());
        state.stacks.insert(key, stack.clone());
        Ok(stack)
    }

    async fn ensure_cell(&self, mut cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("ensure_cell", &key)?;

        cell.status.cgroup_path = naming::cell_cgroup_path(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        )?;
        let mut state = self.state();
        state.cgroups.insert(cell.status.cgroup_path.clone());
        state.root_containers.insert(key.clone());
        state.cells.insert(key, cell.clone());
        Ok(cell)
    }

    async fn start_cell(&self, mut cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("start_cell", &key)?;

        let mut state = self.state();
        state.root_containers.insert(key);
        for spec in &cell.spec.containers {
            let task = naming::build_container_name(
                &cell.spec.realm_name,
                &cell.spec.space_name,
                &cell.metadata.name,
                &spec.name,
            )?;
            state.tasks.insert(task);
        }
        drop(state);
        cell.record_container_states(State::Ready);
        Ok(cell)
    }

    async fn stop_cell(&self, mut cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("stop_cell", &key)?;

        let mut state = self.state();
        for spec in &cell.spec.containers {
            let task = naming::build_container_name(
                &cell.spec.realm_name,
                &cell.spec.space_name,
                &cell.metadata.name,
                &spec.name,
            )?;
            state.tasks.remove(&task);
        }
        drop(state);
        cell.record_container_states(State::Stopped);
        Ok(cell)
    }

    async fn start_container(&self, mut cell: Cell, name: String) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("start_container", &format!("{key}/{name}"))?;

        if cell.container_spec(&name).is_none() {
            return Err(Error::ContainerNotFound { name });
        }
        let task = naming::build_container_name(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.metadata.name,
            &name,
        )?;
        self.state().tasks.insert(task);
        cell.record_container_state(&name, State::Ready);
        Ok(cell)
    }

    async fn stop_container(&self, mut cell: Cell, name: String) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("stop_container", &format!("{key}/{name}"))?;

        if cell.container_spec(&name).is_none() {
            return Err(Error::ContainerNotFound { name });
        }
        let task = naming::build_container_name(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.metadata.name,
            &name,
        )?;
        self.state().tasks.remove(&task);
        cell.record_container_state(&name, State::Stopped);
        Ok(cell)
    }

    async fn delete_realm(&self, realm: Realm) -> Result<()> {
        let name = realm.metadata.name.clone();
        self.record("delete_realm", &name)?;

        let mut state = self.state();
        state.realms.remove(&name);
        if let Ok(path) = naming::realm_cgroup_path(&name) {
            state.cgroups.remove(&path);
        }
        state.namespaces.remove(&realm.spec.namespace);
        Ok(())
    }

    async fn delete_space(&self, space: Space) -> Result<()> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("delete_space", &key)?;

        let mut state = self.state();
        state.spaces.remove(&key);
        if let Ok(path) = naming::space_cgroup_path(&space.spec.realm_name, &space.metadata.name) {
            state.cgroups.remove(&path);
        }
        if let Ok(network) =
            naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)
        {
            state.networks.remove(&network);
        }
        Ok(())
    }

    async fn delete_stack(&self, stack: Stack) -> Result<()> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("delete_stack", &key)?;

        let mut state = self.state();
        state.stacks.remove(&key);
        if let Ok(path) = naming::stack_cgroup_path(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        ) {
            state.cgroups.remove(&path);
        }
        Ok(())
    }

    async fn delete_cell(&self, cell: Cell) -> Result<()> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("delete_cell", &key)?;

        let mut state = self.state();
        state.cells.remove(&key);
        state.root_containers.remove(&key);
        if let Ok(path) = naming::cell_cgroup_path(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        ) {
            state.cgroups.remove(&path);
        }
        for spec in &cell.spec.containers {
            if let Ok(task) = naming::build_container_name(
                &cell.spec.realm_name,
                &cell.spec.space_name,
                &cell.metadata.name,
                &spec.name,
            ) {
                state.tasks.remove(&task);
            }
        }
        Ok(())
    }

    async fn delete_container(&self, mut cell: Cell, name: String) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("delete_container", &format!("{key}/{name}"))?;

        if cell.container_spec(&name).is_none() {
            return Err(Error::ContainerNotFound { name });
        }
        let task = naming::build_container_name(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.metadata.name,
            &name,
        )?;

        let mut state = self.state();
        state.tasks.remove(&task);
        cell.spec.containers.retain(|spec| spec.name != name);
        cell.status.containers.retain(|status| status.name != name);
        state.cells.insert(key, cell.clone());
        Ok(cell)
    }

    async fn purge_realm(&self, realm: Realm) -> Result<Vec<String>> {
        let name = realm.metadata.name.clone();
        self.record("purge_realm", &name)?;
        Ok(self.reap(&format!("{}-", name.to_lowercase())))
    }

    async fn purge_space(&self, space: Space) -> Result<Vec<String>> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("purge_space", &key)?;
        let prefix = naming::build_space_network_name(&space.spec.realm_name, &space.metadata.name)
            .unwrap_or_else(|_| key.replace('/', "-"));
        Ok(self.reap(&prefix))
    }

    async fn purge_stack(&self, stack: Stack) -> Result<Vec<String>> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("purge_stack", &key)?;
        let prefix =
            naming::build_space_network_name(&stack.spec.realm_name, &stack.spec.space_name)
                .unwrap_or_else(|_| key.replace('/', "-"));
        Ok(self.reap(&prefix))
    }

    async fn purge_cell(&self, cell: Cell) -> Result<Vec<String>> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("purge_cell", &key)?;
        let prefix =
            naming::build_space_network_name(&cell.spec.realm_name, &cell.spec.space_name)
                .map(|base| format!("{base}-{}-", cell.metadata.name))
                .unwrap_or_else(|_| key.replace('/', "-"));
        Ok(self.reap(&prefix))
    }

    async fn purge_container(&self, cell: Cell, name: String) -> Result<Vec<String>> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("purge_container", &format!("{key}/{name}"))?;

        let mut entries = Vec::new();
        let spec_id = cell
            .container_spec(&name)
            .and_then(|spec| spec.containerd_id.clone());
        let task = match spec_id {
            Some(id) => id,
            None => {
                entries.push(format!("containerd-id-fallback:{name}"));
                naming::build_container_name(
                    &cell.spec.realm_name,
                    &cell.spec.space_name,
                    &cell.metadata.name,
                    &name,
                )?
            }
        };

        let mut state = self.state();
        let reaped_task = state.tasks.remove(&task);
        let reaped_orphan = state.orphaned_tasks.remove(&task);
        if reaped_task || reaped_orphan {
            entries.push("orphaned-containers".to_string());
        }
        Ok(entries)
    }

    async fn refresh_realm(&self, realm: Realm) -> Result<(Realm, bool)> {
        let name = realm.metadata.name.clone();
        self.record("refresh_realm", &name)?;

        let mut state = self.state();
        let Some(mut stored) = state.realms.get(&name).cloned() else {
            return Err(Error::RealmNotFound { name });
        };

        let cgroup_path = naming::realm_cgroup_path(&name)?;
        let observed = if state.cgroups.contains(&cgroup_path)
            && state.namespaces.contains(&stored.spec.namespace)
        {
            State::Created
        } else {
            State::Unknown
        };

        let updated = stored.status.state != observed || stored.status.cgroup_path != cgroup_path;
        stored.status.state = observed;
        stored.status.cgroup_path = cgroup_path;
        state.realms.insert(name, stored.clone());
        Ok((stored, updated))
    }

    async fn refresh_space(&self, space: Space) -> Result<(Space, bool)> {
        let key = space_key(&space.spec.realm_name, &space.metadata.name);
        self.record("refresh_space", &key)?;

        let mut state = self.state();
        let Some(mut stored) = state.spaces.get(&key).cloned() else {
            return Err(Error::SpaceNotFound {
                name: space.metadata.name,
            });
        };

        let cgroup_path =
            naming::space_cgroup_path(&stored.spec.realm_name, &stored.metadata.name)?;
        let network =
            naming::build_space_network_name(&stored.spec.realm_name, &stored.metadata.name)?;
        let observed = if state.cgroups.contains(&cgroup_path) && state.networks.contains(&network)
        {
            State::Created
        } else {
            State::Unknown
        };

        let updated = stored.status.state != observed
            || stored.status.cgroup_path != cgroup_path
            || stored.status.network_name != network;
        stored.status.state = observed;
        stored.status.cgroup_path = cgroup_path;
        stored.status.network_name = network;
        state.spaces.insert(key, stored.clone());
        Ok((stored, updated))
    }

    async fn refresh_stack(&self, stack: Stack) -> Result<(Stack, bool)> {
        let key = stack_key(
            &stack.spec.realm_name,
            &stack.spec.space_name,
            &stack.metadata.name,
        );
        self.record("refresh_stack", &key)?;

        let mut state = self.state();
        let Some(mut stored) = state.stacks.get(&key).cloned() else {
            return Err(Error::StackNotFound {
                name: stack.metadata.name,
            });
        };

        let cgroup_path = naming::stack_cgroup_path(
            &stored.spec.realm_name,
            &stored.spec.space_name,
            &stored.metadata.name,
        )?;
        let observed = if state.cgroups.contains(&cgroup_path) {
            State::Created
        } else {
            State::Unknown
        };

        let updated = stored.status.state != observed || stored.status.cgroup_path != cgroup_path;
        stored.status.state = observed;
        stored.status.cgroup_path = cgroup_path;
        state.stacks.insert(key, stored.clone());
        Ok((stored, updated))
    }

    async fn refresh_cell(&self, cell: Cell) -> Result<(Cell, usize)> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("refresh_cell", &key)?;

        let mut state = self.state();
        let Some(mut stored) = state.cells.get(&key).cloned() else {
            return Err(Error::CellNotFound {
                name: cell.metadata.name,
            });
        };

        let mut containers_updated = 0;
        let specs = stored.spec.containers.clone();
        for spec in &specs {
            let task = naming::build_container_name(
                &stored.spec.realm_name,
                &stored.spec.space_name,
                &stored.metadata.name,
                &spec.name,
            )?;
            let observed = if state.tasks.contains(&task) {
                State::Ready
            } else {
                State::Stopped
            };
            let previous = stored.container_state(&spec.name).map(|entry| entry.state);
            if previous != Some(observed) {
                containers_updated += 1;
            }
            stored.record_container_state(&spec.name, observed);
        }

        stored.status.cgroup_path = naming::cell_cgroup_path(
            &stored.spec.realm_name,
            &stored.spec.space_name,
            &stored.spec.stack_name,
            &stored.metadata.name,
        )?;
        if stored.has_running_containers() {
            stored.status.state = State::Ready;
        } else if stored.status.state == State::Ready {
            stored.status.state = State::Stopped;
        }

        state.cells.insert(key, stored.clone());
        Ok((stored, containers_updated))
    }

    async fn update_cell_metadata(&self, cell: Cell) -> Result<Cell> {
        let key = cell_key(
            &cell.spec.realm_name,
            &cell.spec.space_name,
            &cell.spec.stack_name,
            &cell.metadata.name,
        );
        self.record("update_cell_metadata", &key)?;
        self.state().cells.insert(key, cell.clone());
        Ok(cell)
    }

    async fn bootstrap_cni(&self, dirs: CniDirectories) -> Result<CniBootstrapReport> {
        let (config_dir, cache_dir, bin_dir) = dirs.resolve();
        self.record("bootstrap_cni", &config_dir.display().to_string())?;

        let mut state = self.state();
        let config_dir_created = state.cni_dirs.insert(config_dir.clone());
        let cache_dir_created = state.cni_dirs.insert(cache_dir.clone());
        let bin_dir_created = state.cni_dirs.insert(bin_dir.clone());
        Ok(CniBootstrapReport {
            config_dir,
            cache_dir,
            bin_dir,
            config_dir_created,
            cache_dir_created,
            bin_dir_created,
        })
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push("close:*".to_string());
        state.close_count += 1;
        if let Some(message) = state.failures.remove("close") {
            return Err(Error::RunnerFailure {
                operation: "close".to_string(),
                message,
            });
        }
        Ok(())
    }
}

impl FakeRunner {
    /// Removes orphaned runtime artefacts under the given prefix, returning
    /// the purge audit entries.
    fn reap(&self, prefix: &str) -> Vec<String> {
        let mut state = self.state();
        let mut entries = Vec::new();

        let residue: Vec<_> = state
            .cni_residue
            .iter()
            .filter(|network| network.starts_with(prefix))
            .cloned()
            .collect();
        if !residue.is_empty() {
            for network in residue {
                state.cni_residue.remove(&network);
                state.networks.remove(&network);
            }
            entries.push("cni-resources".to_string());
        }

        let orphans: Vec<_> = state
            .orphaned_tasks
            .iter()
            .filter(|task| task.starts_with(prefix))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            for task in orphans {
                state.orphaned_tasks.remove(&task);
                state.tasks.remove(&task);
            }
            entries.push("orphaned-containers".to_string());
        }

        entries
    }
}
