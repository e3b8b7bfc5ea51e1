//! Execution contexts
//!
//! A context is a reference-counted capability scope. It owns a pool of heap
//! allocations (including the slots of child contexts and of every handle it
//! created), a policy set and a config layer. Tearing one down reclaims its
//! whole subtree.

use super::abi::{NULL, POINTER_SIZE};
use super::memory::Heap;
use super::reference::ReferenceTable;
use crate::ipc::result::Responder;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Retain-count state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never retained; reclaimed only with its parent
    Created,
    Retained(u32),
    /// Torn down
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub allowed: bool,
}

/// Named capability switches
///
/// A name like `fs_read_file` is checked against `fs_read_file`, then
/// `fs_read`, then `fs`; the most specific registered policy decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow every listed name
    pub fn allowing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            set.set(name.as_ref(), true);
        }
        set
    }

    pub fn set(&mut self, name: &str, allowed: bool) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        match self.policies.iter_mut().find(|p| p.name == name) {
            Some(policy) => policy.allowed = allowed,
            None => self.policies.push(Policy {
                name: name.to_string(),
                allowed,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    /// Decision of the longest registered prefix of `name`
    pub fn decide(&self, name: &str) -> Option<bool> {
        let name = name.trim();
        let mut key = name;
        loop {
            if let Some(policy) = self.get(key) {
                return Some(policy.allowed);
            }
            match key.rfind('_') {
                Some(cut) => key = &key[..cut],
                None => return None,
            }
        }
    }

    /// True when any comma-separated name is allowed
    pub fn is_allowed(&self, names: &str) -> bool {
        names
            .split(',')
            .filter(|n| !n.trim().is_empty())
            .any(|n| self.decide(n) == Some(true))
    }
}

pub type SharedPolicies = Rc<RefCell<PolicySet>>;

/// Error fields a module can attach to a context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextError {
    pub code: i32,
    pub name: Option<String>,
    pub message: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug)]
pub struct ExecutionContext {
    pointer: u32,
    parent: Option<u32>,
    pool: Vec<u32>,
    pub data: u32,
    policies: SharedPolicies,
    own_policies: bool,
    config: BTreeMap<String, String>,
    pub error: Option<ContextError>,
    lifecycle: Lifecycle,
    pub(crate) responder: Option<Responder>,
}

impl ExecutionContext {
    pub fn pointer(&self) -> u32 {
        self.pointer
    }

    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    pub fn pool(&self) -> &[u32] {
        &self.pool
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_retained(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Retained(_))
    }

    pub fn policies(&self) -> SharedPolicies {
        Rc::clone(&self.policies)
    }

    pub fn is_allowed(&self, names: &str) -> bool {
        self.policies.borrow().is_allowed(names)
    }

    pub fn error_mut(&mut self) -> &mut ContextError {
        self.error.get_or_insert_with(ContextError::default)
    }

    fn retain(&mut self) -> bool {
        self.lifecycle = match self.lifecycle {
            Lifecycle::Created => Lifecycle::Retained(1),
            Lifecycle::Retained(n) => Lifecycle::Retained(n.saturating_add(1)),
            Lifecycle::Released => return false,
        };
        true
    }

    /// Drop one reference; true when the count reached zero
    fn release(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Retained(1) => {
                self.lifecycle = Lifecycle::Released;
                true
            }
            Lifecycle::Retained(n) => {
                self.lifecycle = Lifecycle::Retained(n - 1);
                false
            }
            Lifecycle::Created | Lifecycle::Released => false,
        }
    }
}

/// Every live context of one adapter, keyed by handle
#[derive(Debug, Default)]
pub struct ContextTree {
    contexts: BTreeMap<u32, ExecutionContext>,
    /// allocation -> owning context
    owners: HashMap<u32, u32>,
    /// application config at the bottom of every lookup chain
    base_config: BTreeMap<String, String>,
}

impl ContextTree {
    pub fn new(base_config: BTreeMap<String, String>) -> Self {
        Self {
            base_config,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn contains(&self, ptr: u32) -> bool {
        self.contexts.contains_key(&ptr)
    }

    pub fn get(&self, ptr: u32) -> Option<&ExecutionContext> {
        self.contexts.get(&ptr)
    }

    pub fn get_mut(&mut self, ptr: u32) -> Option<&mut ExecutionContext> {
        self.contexts.get_mut(&ptr)
    }

    /// Context owning the allocation at `ptr`
    pub fn owner_of(&self, ptr: u32) -> Option<u32> {
        self.owners.get(&ptr).copied()
    }

    /// Create a context
    ///
    /// A child's slot comes from its parent's pool. Children inherit the
    /// parent's policy set by reference unless `policies` is given. A
    /// context starts retained when asked to or when it has no parent.
    pub fn create(
        &mut self,
        heap: &mut Heap,
        parent: Option<u32>,
        retained: bool,
        policies: Option<PolicySet>,
    ) -> u32 {
        let parent = parent.filter(|p| self.contexts.contains_key(p));

        let pointer = match parent {
            Some(p) => self.alloc(heap, p, POINTER_SIZE),
            None => heap.alloc(POINTER_SIZE),
        };
        if pointer == NULL {
            return NULL;
        }

        let inherited = parent.and_then(|p| self.contexts.get(&p)).map(|c| c.policies());
        let (policies, own_policies) = match (policies, inherited) {
            (Some(set), _) => (Rc::new(RefCell::new(set)), true),
            (None, Some(shared)) => (shared, false),
            (None, None) => (Rc::new(RefCell::new(PolicySet::new())), true),
        };

        let lifecycle = if retained || parent.is_none() {
            Lifecycle::Retained(1)
        } else {
            Lifecycle::Created
        };

        self.contexts.insert(
            pointer,
            ExecutionContext {
                pointer,
                parent,
                pool: Vec::new(),
                data: NULL,
                policies,
                own_policies,
                config: BTreeMap::new(),
                error: None,
                lifecycle,
                responder: None,
            },
        );
        pointer
    }

    /// Allocate from the heap on behalf of `ctx`, tracking it in its pool
    pub fn alloc(&mut self, heap: &mut Heap, ctx: u32, size: u32) -> u32 {
        let Some(context) = self.contexts.get_mut(&ctx) else {
            return NULL;
        };
        let ptr = heap.alloc(size);
        if ptr != NULL {
            context.pool.push(ptr);
            self.owners.insert(ptr, ctx);
        }
        ptr
    }

    /// Stop tracking an allocation that was freed directly
    pub fn forget(&mut self, ptr: u32) {
        if let Some(owner) = self.owners.remove(&ptr) {
            if let Some(context) = self.contexts.get_mut(&owner) {
                context.pool.retain(|p| *p != ptr);
            }
        }
    }

    pub fn retain(&mut self, ptr: u32) -> bool {
        self.contexts
            .get_mut(&ptr)
            .map(ExecutionContext::retain)
            .unwrap_or(false)
    }

    /// Release one reference, tearing the context down at zero
    pub fn release(&mut self, heap: &mut Heap, refs: &mut ReferenceTable, ptr: u32) -> bool {
        let reached_zero = match self.contexts.get_mut(&ptr) {
            Some(context) => context.release(),
            None => return false,
        };
        if reached_zero {
            self.teardown(heap, refs, ptr);
        }
        reached_zero
    }

    fn teardown(&mut self, heap: &mut Heap, refs: &mut ReferenceTable, ptr: u32) {
        let Some(mut context) = self.contexts.remove(&ptr) else {
            return;
        };
        context.lifecycle = Lifecycle::Released;

        for entry in context.pool.drain(..) {
            self.owners.remove(&entry);
            if self.contexts.contains_key(&entry) {
                self.teardown(heap, refs, entry);
            }
            refs.release(entry);
            heap.free(entry);
        }

        heap.free(ptr);
        self.forget(ptr);
    }

    /// Drop everything without touching the heap
    pub fn clear(&mut self) {
        self.contexts.clear();
        self.owners.clear();
    }

    /// Walk the parent chain, then the application config
    pub fn config_get(&self, ptr: u32, key: &str) -> Option<String> {
        let mut cursor = Some(ptr);
        while let Some(current) = cursor {
            let context = self.contexts.get(&current)?;
            if let Some(value) = context.config.get(key) {
                return Some(value.clone());
            }
            cursor = context.parent;
        }
        self.base_config.get(key).cloned()
    }

    pub fn config_set(&mut self, ptr: u32, key: &str, value: &str) -> bool {
        match self.contexts.get_mut(&ptr) {
            Some(context) => {
                context.config.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn is_allowed(&self, ptr: u32, names: &str) -> bool {
        self.contexts
            .get(&ptr)
            .is_some_and(|context| context.is_allowed(names))
    }

    /// Set a policy, detaching an inherited set first
    pub fn set_policy(&mut self, ptr: u32, name: &str, allowed: bool) -> bool {
        let Some(context) = self.contexts.get_mut(&ptr) else {
            return false;
        };
        if !context.own_policies {
            let copy = context.policies.borrow().clone();
            context.policies = Rc::new(RefCell::new(copy));
            context.own_policies = true;
        }
        context.policies.borrow_mut().set(name, allowed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::json::JsonNode;
    use crate::extension::reference::HostValue;

    fn setup() -> (ContextTree, Heap, ReferenceTable) {
        (ContextTree::new(BTreeMap::new()), Heap::new(8, 4096), ReferenceTable::new())
    }

    #[test]
    fn test_policy_prefixes() {
        let policies = PolicySet::allowing(["fs"]);
        assert!(policies.is_allowed("fs_read_file"));
        assert!(policies.is_allowed("fs"));
        assert!(!policies.is_allowed("net_connect"));
        assert!(!policies.is_allowed("fsx"));
        assert!(policies.is_allowed("net_connect, fs_write"));
        assert!(!PolicySet::new().is_allowed("fs"));
    }

    #[test]
    fn test_policy_most_specific_wins() {
        let mut policies = PolicySet::allowing(["ipc"]);
        policies.set("ipc_router_map", false);
        assert!(policies.is_allowed("ipc_invoke"));
        assert!(!policies.is_allowed("ipc_router_map"));
        assert_eq!(policies.decide("ipc_router"), Some(true));

        policies.set("ipc", false);
        policies.set("ipc_router_map", true);
        assert!(policies.is_allowed("ipc_router_map"));
        assert!(!policies.is_allowed("ipc_emit"));
    }

    #[test]
    fn test_root_starts_retained() {
        let (mut tree, mut heap, mut refs) = setup();
        let root = tree.create(&mut heap, None, false, Some(PolicySet::allowing(["ipc"])));
        assert_ne!(root, NULL);
        assert_eq!(tree.get(root).unwrap().lifecycle(), Lifecycle::Retained(1));

        assert!(tree.retain(root));
        assert!(!tree.release(&mut heap, &mut refs, root));
        assert!(tree.release(&mut heap, &mut refs, root));
        assert!(!tree.contains(root));
        assert!(!tree.release(&mut heap, &mut refs, root));
        assert_eq!(heap.allocation_count(), 0);
    }

    #[test]
    fn test_children_inherit_policies_by_reference() {
        let (mut tree, mut heap, _) = setup();
        let root = tree.create(&mut heap, None, false, Some(PolicySet::allowing(["ipc"])));
        let child = tree.create(&mut heap, Some(root), false, None);

        assert!(tree.is_allowed(child, "ipc_invoke"));
        tree.set_policy(root, "fs", true);
        assert!(tree.is_allowed(child, "fs_read"));

        tree.set_policy(child, "net", true);
        assert!(tree.is_allowed(child, "net_connect"));
        assert!(!tree.is_allowed(root, "net_connect"));
        assert!(tree.is_allowed(child, "fs_read"));
    }

    #[test]
    fn test_non_retained_child_lives_until_parent() {
        let (mut tree, mut heap, mut refs) = setup();
        let root = tree.create(&mut heap, None, false, None);
        let child = tree.create(&mut heap, Some(root), false, None);
        assert_eq!(tree.get(child).unwrap().lifecycle(), Lifecycle::Created);
        assert_eq!(tree.owner_of(child), Some(root));

        assert!(!tree.release(&mut heap, &mut refs, child));
        assert!(tree.contains(child));

        assert!(tree.release(&mut heap, &mut refs, root));
        assert!(!tree.contains(child));
        assert!(tree.is_empty());
        assert_eq!(heap.allocation_count(), 0);
    }

    #[test]
    fn test_teardown_reclaims_subtree_and_references() {
        let (mut tree, mut heap, mut refs) = setup();
        let root = tree.create(&mut heap, None, false, None);
        let child = tree.create(&mut heap, Some(root), true, None);
        let grandchild = tree.create(&mut heap, Some(child), true, None);

        let block = tree.alloc(&mut heap, grandchild, 64);
        let handle = tree.alloc(&mut heap, child, POINTER_SIZE);
        refs.insert(handle, HostValue::Json(JsonNode::Null.into_ref()));
        assert_eq!(heap.allocation_count(), 5);

        assert!(tree.release(&mut heap, &mut refs, child));
        assert!(!tree.contains(grandchild));
        assert!(!heap.is_allocated(block));
        assert!(refs.is_empty());
        assert_eq!(tree.get(root).unwrap().pool(), &[] as &[u32]);
        assert_eq!(heap.allocation_count(), 1);
    }

    #[test]
    fn test_retain_release_balance() {
        let (mut tree, mut heap, mut refs) = setup();
        let root = tree.create(&mut heap, None, false, None);
        let ctx = tree.create(&mut heap, Some(root), true, None);
        let scratch = tree.alloc(&mut heap, ctx, 16);

        for _ in 0..3 {
            assert!(tree.retain(ctx));
        }
        for _ in 0..3 {
            assert!(!tree.release(&mut heap, &mut refs, ctx));
        }
        assert!(heap.is_allocated(scratch));
        assert!(tree.release(&mut heap, &mut refs, ctx));
        assert!(!heap.is_allocated(scratch));
        assert!(!heap.is_allocated(ctx));
        assert!(!tree.release(&mut heap, &mut refs, ctx));
    }

    #[test]
    fn test_forget_removes_from_pool() {
        let (mut tree, mut heap, mut refs) = setup();
        let root = tree.create(&mut heap, None, false, None);
        let ptr = tree.alloc(&mut heap, root, 8);
        heap.free(ptr);
        tree.forget(ptr);
        let reused = heap.alloc(8);
        assert_eq!(reused, ptr);

        tree.release(&mut heap, &mut refs, root);
        assert!(heap.is_allocated(reused));
    }

    #[test]
    fn test_config_falls_through_to_parent() {
        let mut base = BTreeMap::new();
        base.insert("meta_title".to_string(), "app".to_string());
        let mut tree = ContextTree::new(base);
        let mut heap = Heap::new(8, 1024);

        let root = tree.create(&mut heap, None, false, None);
        let child = tree.create(&mut heap, Some(root), false, None);
        tree.config_set(root, "mode", "fast");
        assert_eq!(tree.config_get(child, "mode").as_deref(), Some("fast"));
        assert_eq!(tree.config_get(child, "meta_title").as_deref(), Some("app"));

        tree.config_set(child, "mode", "slow");
        assert_eq!(tree.config_get(child, "mode").as_deref(), Some("slow"));
        assert_eq!(tree.config_get(root, "mode").as_deref(), Some("fast"));
        assert_eq!(tree.config_get(root, "missing"), None);
    }
}
