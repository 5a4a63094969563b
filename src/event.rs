//! Event messages and scheduling records.

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::{clone_trait_object, DynClone};
use serde::ser::{self, Impossible, Serialize, SerializeStruct, SerializeStructVariant, SerializeTupleStruct, Serializer};

use crate::component::Id;

/// Monotonically increasing sequence number assigned to an event at scheduling time.
///
/// Unique within a single run; used as the final tiebreaker in the global ordering key, and
/// preserved verbatim across a snapshot/restore round trip.
pub type EventId = u64;

/// Trait implemented by every concrete event payload type.
///
/// A "message variant" is simply a distinct Rust type implementing `EventMessage`; its
/// runtime name (via [`serde_type_name`]) is what a sender's declared send-list is checked
/// against. Payloads are cloned only when a sender needs to keep a copy after handing one
/// off — the scheduler itself moves a message from sender to receiver exactly once.
pub trait EventMessage: Downcast + DynClone + erased_serde::Serialize {}

impl_downcast!(EventMessage);
clone_trait_object!(EventMessage);
erased_serde::serialize_trait_object!(EventMessage);

impl<T: Serialize + DynClone + 'static> EventMessage for T {}

/// Returns the runtime variant name of a message payload.
///
/// This is the identity compared against a sender's declared send-list, and the label shown
/// in diagnostics (log lines, error messages, [`RunSummary`](crate::RunSummary)'s offending
/// event). The receive side is no longer keyed off this string — see
/// [`HandlerTable`](crate::HandlerTable) — so it exists purely for the send-side check and for
/// display. Falls back to a fixed placeholder if the payload type could not be named, which can
/// only happen for types whose `Serialize` implementation is itself broken.
pub fn message_variant(message: &dyn EventMessage) -> &'static str {
    // `serde_type_name::type_name` requires a `Sized` argument, which a `dyn EventMessage`
    // reference is not; `dyn EventMessage` does implement `serde::Serialize` (via
    // `erased_serde::serialize_trait_object!`), so we drive the same name-extracting
    // `Serializer` directly instead of going through that free function.
    message.serialize(TypeNameSerializer).unwrap_or("<unnamed message>")
}

#[derive(Debug)]
struct NotStruct;

impl std::fmt::Display for NotStruct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not struct")
    }
}

impl std::error::Error for NotStruct {}

impl ser::Error for NotStruct {
    fn custom<T: std::fmt::Display>(_msg: T) -> Self {
        NotStruct
    }
}

struct TypeNameStruct(&'static str);

impl SerializeStruct for TypeNameStruct {
    type Ok = &'static str;
    type Error = NotStruct;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, _value: &T) -> Result<(), NotStruct> {
        Ok(())
    }
    fn end(self) -> Result<Self::Ok, NotStruct> {
        Ok(self.0)
    }
}

impl SerializeTupleStruct for TypeNameStruct {
    type Ok = &'static str;
    type Error = NotStruct;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, _value: &T) -> Result<(), NotStruct> {
        Ok(())
    }
    fn end(self) -> Result<Self::Ok, NotStruct> {
        Ok(self.0)
    }
}

impl SerializeStructVariant for TypeNameStruct {
    type Ok = &'static str;
    type Error = NotStruct;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, _value: &T) -> Result<(), NotStruct> {
        Ok(())
    }
    fn end(self) -> Result<Self::Ok, NotStruct> {
        Ok(self.0)
    }
}

struct TypeNameSerializer;

impl Serializer for TypeNameSerializer {
    type Ok = &'static str;
    type Error = NotStruct;
    type SerializeSeq = Impossible<Self::Ok, Self::Error>;
    type SerializeTuple = Impossible<Self::Ok, Self::Error>;
    type SerializeTupleStruct = TypeNameStruct;
    type SerializeTupleVariant = Impossible<Self::Ok, Self::Error>;
    type SerializeMap = Impossible<Self::Ok, Self::Error>;
    type SerializeStruct = TypeNameStruct;
    type SerializeStructVariant = TypeNameStruct;

    fn serialize_bool(self, _v: bool) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_i8(self, _v: i8) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_i16(self, _v: i16) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_i32(self, _v: i32) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_i64(self, _v: i64) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_u8(self, _v: u8) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_u16(self, _v: u16) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_u32(self, _v: u32) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_u64(self, _v: u64) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_f32(self, _v: f32) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_f64(self, _v: f64) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_char(self, _v: char) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_str(self, _v: &str) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_none(self) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_unit(self) -> Result<Self::Ok, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_unit_struct(self, name: &'static str) -> Result<Self::Ok, NotStruct> {
        Ok(name)
    }
    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, NotStruct> {
        Ok(name)
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, NotStruct> {
        Ok(name)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, NotStruct> {
        Ok(name)
    }
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, NotStruct> {
        Ok(TypeNameStruct(name))
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, NotStruct> {
        Err(NotStruct)
    }
    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, NotStruct> {
        Ok(TypeNameStruct(name))
    }
    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, NotStruct> {
        Ok(TypeNameStruct(name))
    }
}

/// A scheduled event as it lives in the global event list.
///
/// Constructed only by [`SimulationContext::send_event`](crate::SimulationContext::send_event)
/// and [`SimulationContext::send_event_at`](crate::SimulationContext::send_event_at); user code
/// never builds one directly. Once popped from the heap it is converted into a
/// [`ReceivedEvent`] and handed to the receiver's handler.
#[derive(Clone)]
pub struct Event {
    /// Sequence number assigned at scheduling time.
    pub sequence_number: EventId,
    /// Simulation time at which the event was scheduled; never later than `receive_time`.
    pub creation_time: f64,
    /// Simulation time at which the event will fire.
    pub receive_time: f64,
    /// Identifier of the object that scheduled the event.
    pub sender: Id,
    /// Identifier of the object the event is addressed to.
    pub receiver: Id,
    /// The event payload.
    pub message: Box<dyn EventMessage>,
}

/// View of an [`Event`] handed to a receiver's handler.
///
/// Exposes everything a handler is allowed to see: who sent it, when it was created and
/// when it fires, and the payload. The receiver's own identity is implicit (it is always
/// the object the handler is running on) and so is not repeated here.
pub struct ReceivedEvent {
    /// Identifier of the sending object.
    pub sender: Id,
    /// Name of the sending object, resolved at dispatch time for convenience.
    pub sender_name: String,
    /// Time at which the sender scheduled this event.
    pub creation_time: f64,
    /// Time at which this event fires (equal to the simulator's current time during dispatch).
    pub receive_time: f64,
    /// The event payload, consumed exactly once by the handler.
    pub message: Box<dyn EventMessage>,
}

impl ReceivedEvent {
    /// Returns the runtime variant name of the carried message.
    pub fn variant(&self) -> &'static str {
        message_variant(self.message.as_ref())
    }
}
