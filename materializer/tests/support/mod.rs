//! Fake collaborators used to drive the materializer end to end without a real debugger.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use materializer::{
    address::{Address, ByteOrder},
    collaborators::{
        ExecutionScope, Frame, MemoryMap, PersistentStore, PersistentVariable, RegisterContext,
        RegisterInfo, Target, ValueObject,
    },
    permissions::{AllocationPolicy, Permissions},
    value::ValueType,
};

/// A flat, infinite fake inferior address space backed by a hash map of allocated regions.
pub struct FakeMemoryMap {
    next_address: u64,
    regions: HashMap<u64, Vec<u8>>,
}

impl FakeMemoryMap {
    /// Creates an empty fake memory map. Allocations start at `0x1000` and climb by `0x1000`
    /// each time, so addresses stay readable in assertion failure messages.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_address: 0x1000,
            regions: HashMap::new(),
        }
    }

    /// Directly installs a region at `address`, as if an earlier expression had already
    /// allocated it; used to seed the argument struct itself.
    pub fn seed(&mut self, address: u64, byte_size: usize) {
        self.regions.insert(address, vec![0u8; byte_size]);
    }

    /// Reads the current contents of a previously seeded or allocated region.
    #[must_use]
    pub fn contents(&self, address: u64) -> &[u8] {
        &self.regions[&address]
    }

    /// Reads the current contents of a region if it is still mapped, or `None` once it has been
    /// freed or was never allocated — used to assert a scratch allocation was actually released.
    #[must_use]
    pub fn try_read(&self, address: u64) -> Option<&[u8]> {
        self.regions.get(&address).map(Vec::as_slice)
    }

    /// Overwrites a region's contents directly, simulating the compiled expression mutating it.
    pub fn poke(&mut self, address: u64, data: &[u8]) {
        self.regions.get_mut(&address).expect("poke: unmapped")[..data.len()]
            .copy_from_slice(data);
    }
}

impl Default for FakeMemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap for FakeMemoryMap {
    fn allocate(
        &mut self,
        byte_size: usize,
        _byte_alignment: usize,
        _permissions: Permissions,
        _policy: AllocationPolicy,
    ) -> Result<Address, Box<dyn std::error::Error>> {
        let address = self.next_address;
        self.next_address += 0x1000;
        self.regions.insert(address, vec![0u8; byte_size]);
        Ok(Address::load(address))
    }

    fn deallocate(&mut self, address: Address) -> Result<(), Box<dyn std::error::Error>> {
        self.regions
            .remove(&address.value)
            .map(|_| ())
            .ok_or_else(|| format!("deallocate: unmapped address {address}").into())
    }

    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), Box<dyn std::error::Error>> {
        let region = self
            .regions
            .get(&address.value)
            .ok_or_else(|| format!("read: unmapped address {address}"))?;
        out.copy_from_slice(&region[..out.len()]);
        Ok(())
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let region = self
            .regions
            .get_mut(&address.value)
            .ok_or_else(|| format!("write: unmapped address {address}"))?;
        region[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }

    fn address_byte_size(&self) -> usize {
        8
    }
}

/// A fake debuggee target, identified only by name.
pub struct FakeTarget {
    name: String,
}

impl FakeTarget {
    /// Creates a fake target with the given description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Target for FakeTarget {
    fn description(&self) -> String {
        self.name.clone()
    }
}

/// A value object backed directly by a slot in a [`FakeMemoryMap`], standing in for an
/// addressable local variable.
pub struct AddressedValue {
    memory_map: Rc<RefCell<FakeMemoryMap>>,
    address: Address,
    value_type: ValueType,
}

impl AddressedValue {
    /// Wraps an existing inferior region as a value object.
    #[must_use]
    pub const fn new(
        memory_map: Rc<RefCell<FakeMemoryMap>>,
        address: Address,
        value_type: ValueType,
    ) -> Self {
        Self {
            memory_map,
            address,
            value_type,
        }
    }
}

impl ValueObject for AddressedValue {
    fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn address(&self) -> Option<Address> {
        Some(self.address)
    }

    fn load_data(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buf = vec![0u8; self.value_type.byte_size];
        self.memory_map.borrow().read(self.address, &mut buf)?;
        Ok(buf)
    }

    fn store_data(&mut self, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        self.memory_map.borrow_mut().write(self.address, data)
    }
}

/// A value object with no stable inferior address, standing in for a register-resident or
/// constant-folded local variable. `load_data`/`store_data` operate on a host-side buffer only.
pub struct UnaddressedValue {
    value_type: ValueType,
    data: Vec<u8>,
}

impl UnaddressedValue {
    /// Creates an unaddressed value with the given initial bytes.
    #[must_use]
    pub const fn new(value_type: ValueType, data: Vec<u8>) -> Self {
        Self { value_type, data }
    }

    /// The value's current host-side bytes, for test assertions.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ValueObject for UnaddressedValue {
    fn value_type(&self) -> ValueType {
        self.value_type
    }

    fn address(&self) -> Option<Address> {
        None
    }

    fn load_data(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.data.clone())
    }

    fn store_data(&mut self, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        self.data = data.to_vec();
        Ok(())
    }
}

/// A fake register file: a name-to-bytes table with no actual inferior behind it.
pub struct FakeRegisterContext {
    registers: RefCell<HashMap<String, Vec<u8>>>,
}

impl FakeRegisterContext {
    /// Creates a register context with a single named register set to `value`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        let mut registers = HashMap::new();
        registers.insert(name.into(), value);
        Self {
            registers: RefCell::new(registers),
        }
    }

    /// The current bytes of a register, for test assertions.
    #[must_use]
    pub fn current(&self, name: &str) -> Vec<u8> {
        self.registers.borrow()[name].clone()
    }
}

impl RegisterContext for FakeRegisterContext {
    fn register_info(&self, name: &str) -> Option<RegisterInfo> {
        self.registers.borrow().get(name).map(|bytes| RegisterInfo {
            name: name.to_string(),
            value_type: ValueType::from_bytes(bytes.len(), bytes.len()),
        })
    }

    fn read_register(&self, register: &RegisterInfo) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        self.registers
            .borrow()
            .get(&register.name)
            .cloned()
            .ok_or_else(|| format!("no such register: {}", register.name).into())
    }

    fn write_register(
        &mut self,
        register: &RegisterInfo,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.registers
            .borrow_mut()
            .insert(register.name.clone(), data.to_vec());
        Ok(())
    }
}

/// A fake stack frame bundling a memory map, an optional register context, and a target.
pub struct FakeFrame {
    memory_map: Rc<RefCell<FakeMemoryMap>>,
    register_context: Option<Rc<RefCell<FakeRegisterContext>>>,
    target: Rc<RefCell<FakeTarget>>,
}

impl FakeFrame {
    /// Creates a fake frame over the given memory map and target, with no register context.
    #[must_use]
    pub fn new(memory_map: Rc<RefCell<FakeMemoryMap>>, target: Rc<RefCell<FakeTarget>>) -> Self {
        Self {
            memory_map,
            register_context: None,
            target,
        }
    }

    /// Attaches a register context to this frame.
    #[must_use]
    pub fn with_registers(mut self, register_context: Rc<RefCell<FakeRegisterContext>>) -> Self {
        self.register_context = Some(register_context);
        self
    }
}

impl ExecutionScope for FakeFrame {
    fn target(&self) -> Option<Rc<RefCell<dyn Target>>> {
        Some(Rc::clone(&self.target) as Rc<RefCell<dyn Target>>)
    }

    fn memory_map(&self) -> Option<Rc<RefCell<dyn MemoryMap>>> {
        Some(Rc::clone(&self.memory_map) as Rc<RefCell<dyn MemoryMap>>)
    }
}

impl Frame for FakeFrame {
    fn register_context(&self) -> Option<Rc<RefCell<dyn RegisterContext>>> {
        self.register_context
            .as_ref()
            .map(|context| Rc::clone(context) as Rc<RefCell<dyn RegisterContext>>)
    }

    fn variable(&self, _name: &str) -> Option<materializer::collaborators::VariableDescriptor> {
        None
    }
}

/// A fake persistent-variable table, minting `$0`, `$1`, ... in order.
#[derive(Default)]
pub struct FakePersistentStore {
    variables: HashMap<String, Rc<RefCell<PersistentVariable>>>,
    next_index: usize,
}

impl PersistentStore for FakePersistentStore {
    fn variable(&self, name: &str) -> Option<Rc<RefCell<PersistentVariable>>> {
        self.variables.get(name).map(Rc::clone)
    }

    fn next_variable_name(&mut self) -> String {
        let name = format!("${}", self.next_index);
        self.next_index += 1;
        name
    }

    fn create_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> Rc<RefCell<PersistentVariable>> {
        let variable = Rc::new(RefCell::new(PersistentVariable {
            flags: materializer::collaborators::PersistentVariableFlags::NONE,
            value_type,
            live_location: None,
            data: Vec::new(),
        }));
        self.variables.insert(name.to_string(), Rc::clone(&variable));
        variable
    }
}
