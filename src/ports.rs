use std::collections::BTreeMap;
use tracing::info;

use crate::error::DataError;
use crate::protocol::ToolInfo;

/// One tracked tool slot, keyed by its device handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Port{
    pub handle: String,
    pub name: String,
    pub serial_number: String,
    pub tool_type: String,
}

impl Port{
    fn new(handle: &str) -> Self{
        Port{ handle: handle.to_string(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortRegistry{
    ports: BTreeMap<String, Port>,
}

impl PortRegistry{
    pub fn new() -> Self{
        PortRegistry{ ports: BTreeMap::new() }
    }

    /// Upserts a port name. Returns true if the handle was already known.
    pub fn assign(&mut self, handle: &str, name: &str) -> bool{
        match self.ports.get_mut(handle){
            Some(port) =>{
                info!(handle, old = %port.name, new = name, "port already configured, renaming");
                port.name = name.to_string();
                true
            }
            None =>{
                let mut port = Port::new(handle);
                port.name = name.to_string();
                self.ports.insert(handle.to_string(), port);
                false
            }
        }
    }

    /// Adds an unnamed port for a newly initialized handle; existing entries are left alone.
    pub fn register(&mut self, handle: &str){
        self.ports.entry(handle.to_string()).or_insert_with(|| Port::new(handle));
    }

    pub fn update_tool_info(&mut self, handle: &str, info: ToolInfo) -> bool{
        match self.ports.get_mut(handle){
            Some(port) =>{
                port.tool_type = info.tool_type;
                port.serial_number = info.serial_number;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, handle: &str) -> Result<&Port, DataError>{
        self.ports.get(handle).ok_or_else(|| DataError::UnknownHandle(handle.to_string()))
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<&Port>{
        self.ports.values().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port>{
        self.ports.values()
    }

    pub fn len(&self) -> usize{
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool{
        self.ports.is_empty()
    }
}
