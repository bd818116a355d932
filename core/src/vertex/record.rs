//! The vertex record: an ordered channel list recorded in lock-step.

use std::fmt;
use std::marker::PhantomData;

use super::channel::{AttributeChannel, Channel, ChannelDescriptor, NullChannel};
use super::layout::{LayoutMode, LayoutPlan};
use super::value::AttributeValue;
use crate::error::VertexError;

/// Recording state of a [`VertexRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Never recorded.
    #[default]
    Uninitialized,
    /// Between `begin` and `end`.
    Recording,
    /// Recorded and laid out.
    Ready,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Recording => "recording",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Typed handle to a channel of a record.
pub struct ChannelKey<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ChannelKey<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Position of the channel in its record.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for ChannelKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ChannelKey<T> {}

impl<T> fmt::Debug for ChannelKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChannelKey").field(&self.index).finish()
    }
}

impl<T> PartialEq for ChannelKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ChannelKey<T> {}

/// An ordered set of channels that always hold the same number of values.
///
/// Channels are declared while the record is uninitialized; the composition
/// is fixed from the first `begin()` on.
///
/// # Example
///
/// ```
/// use redlilium_vertex_core::{ChannelDescriptor, VertexRecord};
///
/// let mut record = VertexRecord::new();
/// let position = record.add_channel::<[f32; 3]>(ChannelDescriptor::position())?;
/// let color = record.add_channel::<[u8; 4]>(ChannelDescriptor::color())?;
/// assert_eq!(record.stride(), 16);
///
/// record.begin()?;
/// record.set(color, [255, 0, 0, 255])?;
/// record.set(position, [0.0, 0.0, 0.0])?;
/// record.push()?;
/// record.set(position, [1.0, 0.0, 0.0])?;
/// record.push()?;
/// let plan = record.end()?;
///
/// assert_eq!(plan.total_size(), 32);
/// # Ok::<(), redlilium_vertex_core::VertexError>(())
/// ```
pub struct VertexRecord {
    channels: Vec<Box<dyn Channel>>,
    state: RecordState,
    vertex_count: usize,
    mode: LayoutMode,
    plan: Option<LayoutPlan>,
}

impl VertexRecord {
    /// Maximum number of channels in one record.
    pub const MAX_CHANNELS: usize = 8;

    /// Create an empty record with the default layout.
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            state: RecordState::Uninitialized,
            vertex_count: 0,
            mode: LayoutMode::default(),
            plan: None,
        }
    }

    /// Set the layout used by `end()`.
    pub fn with_layout_mode(mut self, mode: LayoutMode) -> Self {
        self.mode = mode;
        self
    }

    /// Change the layout used by the next `end()`.
    pub fn set_layout_mode(&mut self, mode: LayoutMode) {
        self.mode = mode;
    }

    /// Declare a typed channel.
    pub fn add_channel<T: AttributeValue>(
        &mut self,
        descriptor: ChannelDescriptor,
    ) -> Result<ChannelKey<T>, VertexError> {
        self.check_can_add("add a channel")?;
        if let Some(existing) = self
            .channels
            .iter()
            .map(|c| c.descriptor())
            .find(|d| !d.is_null() && d.slot == descriptor.slot)
        {
            return Err(VertexError::DuplicateSlot {
                slot: descriptor.slot,
                name: existing.name.to_string(),
            });
        }

        let channel = AttributeChannel::<T>::new(descriptor)?;
        self.channels.push(Box::new(channel));
        Ok(ChannelKey::new(self.channels.len() - 1))
    }

    /// Declare a placeholder channel.
    pub fn add_null_channel(&mut self) -> Result<(), VertexError> {
        self.check_can_add("add a channel")?;
        self.channels.push(Box::new(NullChannel::new()));
        Ok(())
    }

    fn check_can_add(&self, operation: &'static str) -> Result<(), VertexError> {
        if self.state != RecordState::Uninitialized {
            return Err(VertexError::InvalidState {
                operation,
                found: self.state,
            });
        }
        if self.channels.len() >= Self::MAX_CHANNELS {
            return Err(VertexError::TooManyChannels {
                max: Self::MAX_CHANNELS,
            });
        }
        Ok(())
    }

    fn expect_state(&self, expected: RecordState, operation: &'static str) -> Result<(), VertexError> {
        if self.state != expected {
            return Err(VertexError::InvalidState {
                operation,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Start recording: clears every channel and the vertex count.
    pub fn begin(&mut self) -> Result<(), VertexError> {
        if self.state == RecordState::Recording {
            return Err(VertexError::InvalidState {
                operation: "begin recording",
                found: self.state,
            });
        }
        for channel in &mut self.channels {
            channel.reset();
        }
        self.vertex_count = 0;
        self.plan = None;
        self.state = RecordState::Recording;
        Ok(())
    }

    /// Set the working value of one channel.
    ///
    /// Working values persist across pushes and recordings.
    pub fn set<T: AttributeValue>(&mut self, key: ChannelKey<T>, value: T) -> Result<(), VertexError> {
        self.typed_mut(key)?.set(value);
        Ok(())
    }

    /// Append the working value of every channel. Returns the new vertex's
    /// position in the record.
    pub fn push(&mut self) -> Result<usize, VertexError> {
        self.expect_state(RecordState::Recording, "push a vertex")?;
        for channel in &mut self.channels {
            channel.push();
        }
        self.vertex_count += 1;
        Ok(self.vertex_count - 1)
    }

    /// Finish recording and lay out the recorded values.
    pub fn end(&mut self) -> Result<LayoutPlan, VertexError> {
        let plan = self.layout()?;
        log::trace!(
            "Vertex record ended: {} vertices, stride {}, {:?}",
            self.vertex_count,
            plan.stride,
            self.mode
        );
        self.plan = Some(plan.clone());
        self.state = RecordState::Ready;
        Ok(plan)
    }

    /// Plan the layout `end()` would produce without leaving the recording
    /// state.
    ///
    /// Lets an owner allocate and upload first and only commit with `end()`
    /// once that succeeded.
    pub fn layout(&self) -> Result<LayoutPlan, VertexError> {
        self.expect_state(RecordState::Recording, "end recording")?;
        for channel in &self.channels {
            if channel.len() != self.vertex_count {
                return Err(VertexError::LengthMismatch {
                    name: channel.descriptor().name.to_string(),
                    expected: self.vertex_count,
                    actual: channel.len(),
                });
            }
        }

        Ok(LayoutPlan::compute(self.mode, &self.channels, self.vertex_count))
    }

    /// Pack the recorded values per the current plan.
    pub fn pack(&self) -> Result<Vec<u8>, VertexError> {
        self.expect_state(RecordState::Ready, "pack vertices")?;
        match &self.plan {
            Some(plan) => plan.pack(&self.channels),
            None => Err(VertexError::InvalidState {
                operation: "pack vertices",
                found: RecordState::Uninitialized,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Number of recorded vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Bytes per vertex: the sum of every channel's element size.
    pub fn stride(&self) -> usize {
        self.channels.iter().map(|c| c.element_size()).sum()
    }

    /// Layout chosen for the next (or last) `end()`.
    pub fn layout_mode(&self) -> LayoutMode {
        self.mode
    }

    /// Plan computed by the last `end()`, if the record is ready.
    pub fn plan(&self) -> Option<&LayoutPlan> {
        self.plan.as_ref()
    }

    /// All channels, in declaration order.
    pub fn channels(&self) -> &[Box<dyn Channel>] {
        &self.channels
    }

    /// Typed access to one channel.
    pub fn channel<T: AttributeValue>(&self, key: ChannelKey<T>) -> Result<&AttributeChannel<T>, VertexError> {
        self.channels
            .get(key.index)
            .ok_or(VertexError::UnknownChannel { index: key.index })?
            .as_any()
            .downcast_ref::<AttributeChannel<T>>()
            .ok_or(VertexError::ChannelTypeMismatch { index: key.index })
    }

    fn typed_mut<T: AttributeValue>(&mut self, key: ChannelKey<T>) -> Result<&mut AttributeChannel<T>, VertexError> {
        self.channels
            .get_mut(key.index)
            .ok_or(VertexError::UnknownChannel { index: key.index })?
            .as_any_mut()
            .downcast_mut::<AttributeChannel<T>>()
            .ok_or(VertexError::ChannelTypeMismatch { index: key.index })
    }
}

impl Default for VertexRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VertexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexRecord")
            .field(
                "channels",
                &self.channels.iter().map(|c| c.descriptor()).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .field("vertex_count", &self.vertex_count)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::ElementFormat;

    fn position_color() -> (VertexRecord, ChannelKey<[f32; 3]>, ChannelKey<[u8; 4]>) {
        let mut record = VertexRecord::new();
        let position = record.add_channel(ChannelDescriptor::position()).unwrap();
        let color = record.add_channel(ChannelDescriptor::color()).unwrap();
        (record, position, color)
    }

    #[test]
    fn test_state_machine() {
        let (mut record, _, _) = position_color();
        assert_eq!(record.state(), RecordState::Uninitialized);
        assert!(matches!(
            record.end(),
            Err(VertexError::InvalidState {
                found: RecordState::Uninitialized,
                ..
            })
        ));
        assert!(record.push().is_err());

        record.begin().unwrap();
        assert!(record.begin().is_err());
        assert_eq!(record.state(), RecordState::Recording);
        record.end().unwrap();
        assert_eq!(record.state(), RecordState::Ready);
        assert!(record.push().is_err());

        record.begin().unwrap();
        assert_eq!(record.state(), RecordState::Recording);
    }

    #[test]
    fn test_channels_stay_in_lock_step() {
        let (mut record, position, color) = position_color();
        record.add_null_channel().unwrap();

        for n in [0usize, 1, 7] {
            record.begin().unwrap();
            for i in 0..n {
                record.set(position, [i as f32, 0.0, 0.0]).unwrap();
                assert_eq!(record.push().unwrap(), i);
            }
            let plan = record.end().unwrap();

            assert_eq!(record.vertex_count(), n);
            for channel in record.channels() {
                assert_eq!(channel.len(), n);
            }
            assert_eq!(record.channel(color).unwrap().byte_size(), 4 * n);
            assert_eq!(plan.total_size(), record.pack().unwrap().len());
        }
    }

    #[test]
    fn test_layout_does_not_commit() {
        let (mut record, _, _) = position_color();
        assert!(record.layout().is_err());

        record.begin().unwrap();
        record.push().unwrap();
        record.push().unwrap();
        let planned = record.layout().unwrap();
        assert_eq!(planned.total_size(), 32);
        assert_eq!(record.state(), RecordState::Recording);
        assert!(record.plan().is_none());

        assert_eq!(record.end().unwrap(), planned);
        assert_eq!(record.plan(), Some(&planned));
    }

    #[test]
    fn test_composition_fixed_after_begin() {
        let (mut record, _, _) = position_color();
        record.begin().unwrap();
        assert!(matches!(
            record.add_channel::<[f32; 3]>(ChannelDescriptor::normal()),
            Err(VertexError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let (mut record, _, _) = position_color();
        let err = record.add_channel::<[f32; 4]>(ChannelDescriptor::color_f32()).unwrap_err();
        assert_eq!(
            err,
            VertexError::DuplicateSlot {
                slot: 2,
                name: "color".to_string()
            }
        );
    }

    #[test]
    fn test_channel_limit() {
        let mut record = VertexRecord::new();
        for slot in 0..VertexRecord::MAX_CHANNELS as u32 {
            record
                .add_channel::<f32>(ChannelDescriptor::new(format!("c{slot}"), slot, ElementFormat::FLOAT))
                .unwrap();
        }
        assert_eq!(
            record.add_null_channel(),
            Err(VertexError::TooManyChannels { max: 8 })
        );
    }

    #[test]
    fn test_foreign_key_is_rejected() {
        let (mut record, _, _) = position_color();
        let (_, _, other_color) = position_color();
        let wrong: ChannelKey<[f32; 3]> = ChannelKey::new(other_color.index());
        assert_eq!(
            record.set(wrong, [0.0; 3]),
            Err(VertexError::ChannelTypeMismatch { index: 1 })
        );
        let missing: ChannelKey<f32> = ChannelKey::new(5);
        assert_eq!(
            record.set(missing, 0.0),
            Err(VertexError::UnknownChannel { index: 5 })
        );
    }

    #[test]
    fn test_working_value_persists() {
        let (mut record, position, color) = position_color();
        record.set(color, [1, 2, 3, 4]).unwrap();
        record.begin().unwrap();
        record.push().unwrap();
        record.set(position, [5.0, 6.0, 7.0]).unwrap();
        record.push().unwrap();
        record.end().unwrap();

        let colors = record.channel(color).unwrap().values();
        assert_eq!(colors, &[[1, 2, 3, 4], [1, 2, 3, 4]]);
        let positions = record.channel(position).unwrap().values();
        assert_eq!(positions, &[[0.0; 3], [5.0, 6.0, 7.0]]);
    }
}
