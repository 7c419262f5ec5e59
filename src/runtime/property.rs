//! Typed property access keyed by [`PropertyKey`]

use super::error::PropertyError;
use super::TrackingRuntime;
use crate::device::SlotIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    ControllerRole,
    RenderModelName,
    SerialNumber,
    ManufacturerName,
    BatteryPercentage,
    DeviceIsWireless,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Text(_) => "text",
            PropertyValue::Float(_) => "float",
            PropertyValue::Int(_) => "int",
            PropertyValue::Bool(_) => "bool",
        }
    }
}

fn wrong_type(
    slot: SlotIndex,
    key: PropertyKey,
    expected: &'static str,
    value: &PropertyValue,
) -> PropertyError {
    PropertyError::WrongType {
        slot,
        key,
        expected,
        actual: value.type_name(),
    }
}

pub fn text_property(
    runtime: &dyn TrackingRuntime,
    slot: SlotIndex,
    key: PropertyKey,
) -> Result<String, PropertyError> {
    match runtime.property(slot, key)? {
        PropertyValue::Text(text) => Ok(text),
        other => Err(wrong_type(slot, key, "text", &other)),
    }
}

pub fn int_property(
    runtime: &dyn TrackingRuntime,
    slot: SlotIndex,
    key: PropertyKey,
) -> Result<i32, PropertyError> {
    match runtime.property(slot, key)? {
        PropertyValue::Int(value) => Ok(value),
        other => Err(wrong_type(slot, key, "int", &other)),
    }
}

pub fn float_property(
    runtime: &dyn TrackingRuntime,
    slot: SlotIndex,
    key: PropertyKey,
) -> Result<f32, PropertyError> {
    match runtime.property(slot, key)? {
        PropertyValue::Float(value) => Ok(value),
        other => Err(wrong_type(slot, key, "float", &other)),
    }
}

pub fn bool_property(
    runtime: &dyn TrackingRuntime,
    slot: SlotIndex,
    key: PropertyKey,
) -> Result<bool, PropertyError> {
    match runtime.property(slot, key)? {
        PropertyValue::Bool(value) => Ok(value),
        other => Err(wrong_type(slot, key, "bool", &other)),
    }
}
