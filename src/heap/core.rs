//! `SymHeap` — the symbolic heap core (C2, §4.2).

use crate::common::error::AnalysisError;
use crate::common::types::TypeTable;
use crate::heap::object::{BindingOff, ObjKind, Object, Storage, VarRef};
use crate::heap::value::{Value, ValueCode};
use crate::ids::{ObjId, TypeId, ValId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One symbolic heap: an object arena, a value arena, and the indices the
/// SHC operations need (§3, §4.2). Cloning performs a deep copy with id
/// preservation, as required by join (§4.1).
#[derive(Debug, Clone)]
pub struct SymHeap {
    types: Arc<TypeTable>,
    objects: Vec<Object>,
    values: Vec<Value>,
    /// Hash-consing index for `offsetBy`: `(base, total_offset) -> ValId`.
    offset_index: HashMap<(ValId, i64), ValId>,
    /// Normalized (a < b) disequality pairs (§3.4).
    neq: BTreeSet<(ValId, ValId)>,
    /// Program-variable objects by `(cVarUid, inst)`.
    var_index: HashMap<(u32, u32), ObjId>,
    /// The current frame's return slot; `OBJ_RETURN` has no arena entry.
    return_value: ValId,
}

impl SymHeap {
    pub fn new(types: Arc<TypeTable>) -> Self {
        Self {
            types,
            objects: Vec::new(),
            values: Vec::new(),
            offset_index: HashMap::new(),
            neq: BTreeSet::new(),
            var_index: HashMap::new(),
            return_value: ValId::UNINITIALIZED,
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn types_arc(&self) -> Arc<TypeTable> {
        Arc::clone(&self.types)
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Read-only lookup for introspection callers (diagnostics, the plot
    /// visitor); `None` for a sentinel or out-of-range id.
    pub fn object(&self, id: ObjId) -> Option<&Object> {
        self.obj(id).ok()
    }

    /// Read-only lookup for introspection callers; `None` for a sentinel or
    /// out-of-range id.
    pub fn value(&self, id: ValId) -> Option<&Value> {
        self.val(id).ok()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    fn obj(&self, id: ObjId) -> Result<&Object, AnalysisError> {
        id.index()
            .map(|i| &self.objects[i])
            .ok_or_else(|| AnalysisError::contract(format!("no such object: {id}")))
    }

    fn obj_mut(&mut self, id: ObjId) -> Result<&mut Object, AnalysisError> {
        id.index()
            .map(move |i| &mut self.objects[i])
            .ok_or_else(|| AnalysisError::contract(format!("no such object: {id}")))
    }

    fn val(&self, id: ValId) -> Result<&Value, AnalysisError> {
        id.index()
            .map(|i| &self.values[i])
            .ok_or_else(|| AnalysisError::contract(format!("no such value: {id}")))
    }

    pub(crate) fn alloc_value(&mut self, v: Value) -> ValId {
        let id = ValId::from_index(self.values.len());
        self.values.push(v);
        id
    }

    fn alloc_object(&mut self, o: Object) -> ObjId {
        let id = ObjId::from_index(self.objects.len());
        self.objects.push(o);
        id
    }

    // ---- C1 identity accessors ----------------------------------------

    /// Bidirectional with [`SymHeap::target`]: the address value at
    /// `offset == 0` for `obj`, hash-consed for sub-fields.
    pub fn address_of(&mut self, obj: ObjId) -> ValId {
        if obj.is_sentinel() {
            return ValId::INVALID;
        }
        let (placed_at, root_offset) = {
            let o = &self.objects[obj.index().unwrap()];
            (o.placed_at, o.root_offset)
        };
        if root_offset == 0 {
            placed_at
        } else {
            self.offset_by(placed_at, root_offset as i64)
                .expect("placed_at is always an address value")
        }
    }

    /// Bidirectional with [`SymHeap::address_of`]. Total: never errors.
    /// Offset-derived values resolve through their `base`'s `pointsTo`, so a
    /// destroyed root's sentinel rewrite is visible to every alias (§3.5).
    pub fn target(&self, val: ValId) -> ObjId {
        match val {
            ValId::INVALID | ValId::NULL | ValId::TRUE => ObjId::INVALID,
            ValId::DEREF_FAILED | ValId::UNINITIALIZED => ObjId::DEREF_FAILED,
            ValId::UNKNOWN => ObjId::UNKNOWN,
            dense => {
                let v = match self.val(dense) {
                    Ok(v) => v,
                    Err(_) => return ObjId::INVALID,
                };
                if !v.is_address() {
                    return ObjId::INVALID;
                }
                if v.offset == 0 {
                    v.points_to
                } else {
                    self.target(v.base)
                }
            }
        }
    }

    // ---- C2 operations --------------------------------------------------

    /// Allocates a root object of `ty`, its address value, and (if `ty` is
    /// aggregate) its sub-tree.
    pub fn root_create(
        &mut self,
        ty: TypeId,
        var: Option<VarRef>,
        storage: Storage,
    ) -> Result<ObjId, AnalysisError> {
        let addr_placeholder = self.alloc_value(Value {
            code: match storage {
                Storage::Heap => ValueCode::OnHeap,
                Storage::Stack => ValueCode::OnStack,
            },
            ty: None,
            points_to: ObjId::INVALID,
            offset: 0,
            base: ValId::INVALID, // patched below
            used_by: BTreeSet::new(),
        });
        let cl = self.types.get(ty).clone();
        let initial_value = if cl.is_aggregate() { ValId::INVALID } else { ValId::UNINITIALIZED };
        let root = self.alloc_object(Object {
            ty: Some(ty),
            anon_size: None,
            kind: ObjKind::Concrete,
            binding: None,
            min_len: 0,
            placed_at: addr_placeholder,
            value: initial_value,
            parent: None,
            sub_fields: Vec::new(),
            var,
            storage,
            root: ObjId::INVALID, // patched below
            root_offset: 0,
        });
        {
            let addr = &mut self.values[addr_placeholder.index().unwrap()];
            addr.points_to = root;
            addr.base = addr_placeholder;
        }
        self.objects[root.index().unwrap()].root = root;
        self.offset_index.insert((addr_placeholder, 0), addr_placeholder);

        if cl.is_aggregate() {
            let children = self.spawn_fields(root, addr_placeholder, &cl, 0, storage)?;
            let composite = self.alloc_value(Value {
                code: ValueCode::Composite(root),
                ty: Some(ty),
                points_to: ObjId::INVALID,
                offset: 0,
                base: ValId::INVALID,
                used_by: BTreeSet::new(),
            });
            self.objects[root.index().unwrap()].value = composite;
            self.objects[root.index().unwrap()].sub_fields = children;
        }

        if let Some(v) = var {
            self.var_index.insert((v.c_var_uid, v.inst), root);
        }
        Ok(root)
    }

    /// Recursively materializes `ty`'s fields as children of `root`, each
    /// addressed at `base_offset + field.offset` from the root.
    fn spawn_fields(
        &mut self,
        root: ObjId,
        root_addr: ValId,
        ty: &crate::common::types::ClType,
        base_offset: u32,
        storage: Storage,
    ) -> Result<Vec<ObjId>, AnalysisError> {
        let mut out = Vec::with_capacity(ty.fields.len());
        for field in &ty.fields {
            let abs_offset = base_offset + field.offset;
            let field_addr = self.offset_by(root_addr, abs_offset as i64)?;
            let field_ty = self.types.get(field.ty).clone();
            let child = self.alloc_object(Object {
                ty: Some(field.ty),
                anon_size: None,
                kind: ObjKind::Concrete,
                binding: None,
                min_len: 0,
                placed_at: root_addr,
                value: if field_ty.is_aggregate() { ValId::INVALID } else { ValId::UNINITIALIZED },
                parent: Some(root),
                sub_fields: Vec::new(),
                var: None,
                storage,
                root,
                root_offset: abs_offset,
            });
            let _ = field_addr;
            if field_ty.is_aggregate() {
                let grandchildren = self.spawn_fields(root, root_addr, &field_ty, abs_offset, storage)?;
                let composite = self.alloc_value(Value {
                    code: ValueCode::Composite(child),
                    ty: Some(field.ty),
                    points_to: ObjId::INVALID,
                    offset: 0,
                    base: ValId::INVALID,
                    used_by: BTreeSet::new(),
                });
                self.objects[child.index().unwrap()].value = composite;
                self.objects[child.index().unwrap()].sub_fields = grandchildren;
            }
            out.push(child);
        }
        Ok(out)
    }

    /// Allocates a typeless raw region of `size_bytes`.
    pub fn root_create_anon(&mut self, size_bytes: u32) -> Result<ObjId, AnalysisError> {
        let addr_placeholder = self.alloc_value(Value {
            code: ValueCode::OnHeap,
            ty: None,
            points_to: ObjId::INVALID,
            offset: 0,
            base: ValId::INVALID,
            used_by: BTreeSet::new(),
        });
        let root = self.alloc_object(Object {
            ty: None,
            anon_size: Some(size_bytes),
            kind: ObjKind::Concrete,
            binding: None,
            min_len: 0,
            placed_at: addr_placeholder,
            value: ValId::UNINITIALIZED,
            parent: None,
            sub_fields: Vec::new(),
            var: None,
            storage: Storage::Heap,
            root: ObjId::INVALID,
            root_offset: 0,
        });
        {
            let addr = &mut self.values[addr_placeholder.index().unwrap()];
            addr.points_to = root;
            addr.base = addr_placeholder;
        }
        self.objects[root.index().unwrap()].root = root;
        self.offset_index.insert((addr_placeholder, 0), addr_placeholder);
        Ok(root)
    }

    /// Installs `ty` on an anonymous region and spawns its sub-tree. Fails
    /// if `obj` is already typed.
    pub fn define_type(&mut self, obj: ObjId, ty: TypeId) -> Result<(), AnalysisError> {
        let o = self.obj(obj)?;
        if o.ty.is_some() {
            return Err(AnalysisError::contract(format!("{obj} is already typed")));
        }
        let root_addr = o.placed_at;
        let cl = self.types.get(ty).clone();
        self.obj_mut(obj)?.ty = Some(ty);
        if cl.is_aggregate() {
            let children = self.spawn_fields(obj, root_addr, &cl, 0, self.obj(obj)?.storage)?;
            let composite = self.alloc_value(Value {
                code: ValueCode::Composite(obj),
                ty: Some(ty),
                points_to: ObjId::INVALID,
                offset: 0,
                base: ValId::INVALID,
                used_by: BTreeSet::new(),
            });
            let o = self.obj_mut(obj)?;
            o.value = composite;
            o.sub_fields = children;
        }
        Ok(())
    }

    /// Recursively destroys `obj`, which must be a root. Rewrites the root's
    /// address value's `pointsTo` to `OBJ_DELETED`/`OBJ_LOST` per `storage`;
    /// the address value itself is not destroyed (§3.5). `OBJ_RETURN` is
    /// special-cased: destroying it re-initializes the return slot (B2).
    pub fn destroy(&mut self, obj: ObjId) -> Result<(), AnalysisError> {
        if obj == ObjId::RETURN {
            self.return_value = ValId::UNINITIALIZED;
            return Ok(());
        }
        let o = self.obj(obj)?;
        if !o.is_root() {
            return Err(AnalysisError::contract(format!("destroy called on non-root {obj}")));
        }
        let (addr, new_code, new_target) = match o.storage {
            Storage::Heap => (o.placed_at, ValueCode::Deleted, ObjId::DELETED),
            Storage::Stack => (o.placed_at, ValueCode::Lost, ObjId::LOST),
        };
        let v = &mut self.values[addr.index().unwrap()];
        v.code = new_code;
        v.points_to = new_target;
        Ok(())
    }

    /// Total: returns `VAL_DEREF_FAILED` for sentinel objects and for reads
    /// through a destroyed root's sub-tree.
    pub fn read_value(&self, obj: ObjId) -> ValId {
        if obj == ObjId::RETURN {
            return self.return_value;
        }
        let idx = match obj.index() {
            Some(i) => i,
            None => return ValId::DEREF_FAILED,
        };
        let o = &self.objects[idx];
        if let Ok(root_addr) = self.val(o.placed_at) {
            if matches!(root_addr.code, ValueCode::Deleted | ValueCode::Lost) {
                return ValId::DEREF_FAILED;
            }
        }
        o.value
    }

    /// Forbidden through a sentinel object id (contract violation) and for
    /// `COMPOSITE` writes into a scalar object.
    pub fn write_value(&mut self, obj: ObjId, val: ValId) -> Result<(), AnalysisError> {
        if obj == ObjId::RETURN {
            self.return_value = val;
            return Ok(());
        }
        if obj.is_sentinel() {
            return Err(AnalysisError::contract(format!("wrote through sentinel object {obj}")));
        }
        let is_aggregate = self.obj(obj)?.ty.map(|t| self.types.get(t).is_aggregate()).unwrap_or(false);
        if let Ok(v) = self.val(val) {
            if matches!(v.code, ValueCode::Composite(_)) && !is_aggregate {
                return Err(AnalysisError::contract("wrote COMPOSITE through a scalar object"));
            }
        }
        let old = self.obj(obj)?.value;
        if old == val {
            return Ok(());
        }
        if let Some(i) = old.index() {
            self.values[i].used_by.remove(&obj);
        }
        if let Some(i) = val.index() {
            self.values[i].used_by.insert(obj);
        }
        self.obj_mut(obj)?.value = val;
        Ok(())
    }

    /// Returns the canonical value for `root(val) + offset(val) + delta`,
    /// hash-consed per heap (R2).
    pub fn offset_by(&mut self, val: ValId, delta: i64) -> Result<ValId, AnalysisError> {
        let v = self
            .val(val)
            .map_err(|_| AnalysisError::contract("offsetBy on an unknown value"))?;
        if !v.is_address() {
            return Err(AnalysisError::contract("offsetBy on a non-address value"));
        }
        let (base, total) = if v.offset == 0 { (val, delta) } else { (v.base, v.offset + delta) };
        if total == 0 {
            return Ok(base);
        }
        if let Some(existing) = self.offset_index.get(&(base, total)) {
            return Ok(*existing);
        }
        let base_code = self.val(base)?.code.clone();
        let base_ty = self.val(base)?.ty;
        let new_id = self.alloc_value(Value {
            code: base_code,
            ty: base_ty,
            points_to: ObjId::INVALID,
            offset: total,
            base,
            used_by: BTreeSet::new(),
        });
        self.offset_index.insert((base, total), new_id);
        Ok(new_id)
    }

    /// Looks up an already-hash-consed `offsetBy(val, delta)` result without
    /// allocating. Used by chain-walking code (`heap::segment`) that only
    /// needs to read fields a typed root already materialized.
    pub fn peek_offset(&self, val: ValId, delta: i64) -> Option<ValId> {
        let v = self.val(val).ok()?;
        if !v.is_address() {
            return None;
        }
        let (base, total) = if v.offset == 0 { (val, delta) } else { (v.base, v.offset + delta) };
        if total == 0 {
            return Some(base);
        }
        self.offset_index.get(&(base, total)).copied()
    }

    /// Resolves a (possibly-offset) address to the sub-object at that offset
    /// within its root. Returns `OBJ_UNKNOWN` (not `OBJ_INVALID`) for an
    /// offset with no matching field, including one past the root's size
    /// (B3); `OBJ_DEREF_FAILED` if the root was destroyed.
    pub fn obj_at_offset(&self, val: ValId) -> ObjId {
        let v = match self.val(val) {
            Ok(v) => v,
            Err(_) => return ObjId::DEREF_FAILED,
        };
        if !v.is_address() {
            return ObjId::DEREF_FAILED;
        }
        let base = if v.offset == 0 { val } else { v.base };
        let wanted = v.offset;
        let root_obj = match self.val(base) {
            Ok(b) => b.points_to,
            Err(_) => return ObjId::DEREF_FAILED,
        };
        if root_obj.is_sentinel() {
            return ObjId::DEREF_FAILED;
        }
        if wanted == 0 {
            return root_obj;
        }
        let root_idx = root_obj.index().unwrap();
        let root = &self.objects[root_idx];
        if matches!(self.val(root.placed_at), Ok(a) if matches!(a.code, ValueCode::Deleted | ValueCode::Lost))
        {
            return ObjId::DEREF_FAILED;
        }
        self.find_subfield(root_obj, wanted as u32).unwrap_or(ObjId::UNKNOWN)
    }

    fn find_subfield(&self, obj: ObjId, wanted_offset: u32) -> Option<ObjId> {
        let o = &self.objects[obj.index()?];
        if o.root_offset == wanted_offset {
            return Some(obj);
        }
        for &sub in &o.sub_fields {
            if let Some(found) = self.find_subfield(sub, wanted_offset) {
                return Some(found);
            }
        }
        None
    }

    pub fn used_by_count(&self, val: ValId) -> usize {
        self.val(val).map(|v| v.used_by.len()).unwrap_or(0)
    }

    pub fn enum_used_by(&self, val: ValId) -> Vec<ObjId> {
        self.val(val).map(|v| v.used_by.iter().copied().collect()).unwrap_or_default()
    }

    fn normalize_pair(a: ValId, b: ValId) -> (ValId, ValId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn neq_add(&mut self, a: ValId, b: ValId) {
        if a == b {
            return;
        }
        self.neq.insert(Self::normalize_pair(a, b));
    }

    pub fn neq_del(&mut self, a: ValId, b: ValId) {
        self.neq.remove(&Self::normalize_pair(a, b));
    }

    pub fn prove_neq(&self, a: ValId, b: ValId) -> bool {
        if a == b {
            return false;
        }
        if (a == ValId::NULL && b == ValId::TRUE) || (b == ValId::NULL && a == ValId::TRUE) {
            return true;
        }
        self.neq.contains(&Self::normalize_pair(a, b))
    }

    pub fn neq_pairs(&self) -> impl Iterator<Item = &(ValId, ValId)> {
        self.neq.iter()
    }

    /// Turns `obj` in place into a segment of `kind` with the given binding
    /// and `min_len`. The multi-node merge that collapses several concrete
    /// objects into one is [`crate::heap::join`]'s responsibility; this is
    /// the primitive kind-flip it builds on.
    ///
    /// An abstract placeholder has no real sub-tree: its `sub_fields` are
    /// dropped and its `value` slot is repurposed to hold `exit`, the
    /// address the chain continues to past `minLen` concrete nodes. This is
    /// a deliberate simplification over tracking a separate per-node value
    /// for every collapsed concrete node (see `DESIGN.md`).
    pub fn set_abstract(
        &mut self,
        obj: ObjId,
        kind: ObjKind,
        binding: BindingOff,
        min_len: u8,
        exit: ValId,
    ) -> Result<(), AnalysisError> {
        if kind.is_concrete() {
            return Err(AnalysisError::contract("set_abstract requires a non-concrete kind"));
        }
        let o = self.obj_mut(obj)?;
        if !o.is_root() {
            return Err(AnalysisError::contract("abstract requires a root object"));
        }
        o.kind = kind;
        o.binding = Some(binding);
        o.min_len = min_len;
        o.value = exit;
        o.sub_fields = Vec::new();
        Ok(())
    }

    /// Splits an abstract segment into a concrete head (`obj` itself,
    /// rebuilt in place with a fresh sub-tree of its node type) and a `rest`
    /// segment object one node shorter, freshly allocated and linked from
    /// the head's `next` field. `rest` collapses to `MAY_EXIST` once its
    /// `min_len` reaches zero; it carries the original segment's `exit`
    /// value forward.
    pub fn concretize(&mut self, obj: ObjId) -> Result<(ObjId, ObjId), AnalysisError> {
        let o = self.obj(obj)?.clone_shape();
        if o.kind.is_concrete() {
            return Err(AnalysisError::contract("concretize requires an abstract object"));
        }
        let binding = o
            .binding
            .ok_or_else(|| AnalysisError::contract("abstract object missing binding offsets"))?;
        let ty = o
            .ty
            .ok_or_else(|| AnalysisError::contract("abstract segment object missing its node type"))?;
        let exit = self.obj(obj)?.value;
        let head_addr = o.placed_at;

        let cl = self.types.get(ty).clone();
        let children = self.spawn_fields(obj, head_addr, &cl, 0, o.storage)?;
        let composite = self.alloc_value(Value {
            code: ValueCode::Composite(obj),
            ty: Some(ty),
            points_to: ObjId::INVALID,
            offset: 0,
            base: ValId::INVALID,
            used_by: BTreeSet::new(),
        });
        {
            let head = self.obj_mut(obj)?;
            head.kind = ObjKind::Concrete;
            head.binding = None;
            head.min_len = 0;
            head.value = composite;
            head.sub_fields = children;
        }

        let rest_min_len = o.min_len.saturating_sub(1);
        let rest_kind = if rest_min_len == 0 { ObjKind::MayExist } else { o.kind };
        let rest_addr = self.alloc_value(Value {
            code: ValueCode::Abstract,
            ty: None,
            points_to: ObjId::INVALID,
            offset: 0,
            base: ValId::INVALID,
            used_by: BTreeSet::new(),
        });
        let rest = self.alloc_object(Object {
            ty: Some(ty),
            anon_size: None,
            kind: rest_kind,
            binding: Some(binding),
            min_len: rest_min_len,
            placed_at: rest_addr,
            value: exit,
            parent: None,
            sub_fields: Vec::new(),
            var: None,
            storage: o.storage,
            root: ObjId::INVALID,
            root_offset: 0,
        });
        {
            let addr = &mut self.values[rest_addr.index().unwrap()];
            addr.points_to = rest;
            addr.base = rest_addr;
        }
        self.objects[rest.index().unwrap()].root = rest;
        self.offset_index.insert((rest_addr, 0), rest_addr);

        let next_field_val = self.offset_by(head_addr, binding.next as i64)?;
        let next_field_obj = self.obj_at_offset(next_field_val);
        self.write_value(next_field_obj, rest_addr)?;

        Ok((obj, rest))
    }

    // ---- §6.2 enumerators ------------------------------------------------

    pub fn gather_cvars(&self) -> Vec<(u32, u32)> {
        let mut keys: Vec<_> = self.var_index.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn var_object(&self, c_var_uid: u32, inst: u32) -> Option<ObjId> {
        self.var_index.get(&(c_var_uid, inst)).copied()
    }

    pub fn gather_root_objects(&self) -> Vec<ValId> {
        let mut out: Vec<ValId> = self
            .objects
            .iter()
            .filter(|o| o.is_root())
            .map(|o| o.placed_at)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn gather_related_values(&self, reference: ValId) -> Vec<ValId> {
        let mut out = Vec::new();
        for &(a, b) in &self.neq {
            if a == reference {
                out.push(b);
            } else if b == reference {
                out.push(a);
            }
        }
        out.sort_unstable();
        out
    }
}

impl Object {
    /// A cheap copy of the scalar fields needed by `concretize`, avoiding a
    /// borrow of the whole object across the allocation it triggers.
    fn clone_shape(&self) -> ObjShape {
        ObjShape {
            ty: self.ty,
            kind: self.kind,
            binding: self.binding,
            min_len: self.min_len,
            placed_at: self.placed_at,
            storage: self.storage,
        }
    }
}

struct ObjShape {
    ty: Option<TypeId>,
    kind: ObjKind,
    binding: Option<BindingOff>,
    min_len: u8,
    placed_at: ValId,
    storage: Storage,
}
