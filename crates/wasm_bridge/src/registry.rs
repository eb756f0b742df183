//! Typed handle pools backing the integer handles exchanged with the module.
//!
//! Every resource type owns one append-only pool, so an index handed out for a
//! buffer can never be resolved against the pipeline pool. The module only ever
//! sees the dense index returned by a push; slots are never freed or reordered.
//!
//! A slot may hold a deferred creation while the native object is still being
//! built. Deferred creations are shared futures so that dependents (a bind
//! group waiting on its pipeline's layout) can await the same result.

use anyhow::{Error as AnyhowError, Result as AnyResult, anyhow};
use core::fmt;
use futures::FutureExt as _;
use futures::future::{LocalBoxFuture, Shared};
use std::sync::Arc;
use wgpu::{BindGroup, Buffer, RenderPipeline};

/// Error shared between every clone of a deferred creation.
pub type CreationError = Arc<AnyhowError>;

/// A creation that completes later; cloneable so dependents can await it too.
pub type Deferred<T> = Shared<LocalBoxFuture<'static, Result<T, CreationError>>>;

/// Wrap a future into a shareable deferred creation.
pub fn defer<T, F>(future: F) -> Deferred<T>
where
    T: Clone + 'static,
    F: Future<Output = Result<T, CreationError>> + 'static,
{
    future.boxed_local().shared()
}

/// Resource type a pool holds. The module never sees this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    Buffer,
    RenderPipeline,
    BindGroup,
    TextureView,
    Sampler,
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::RenderPipeline => "render pipeline",
            Self::BindGroup => "bind group",
            Self::TextureView => "texture view",
            Self::Sampler => "sampler",
        };
        f.write_str(name)
    }
}

/// One pool entry: either the concrete object or its pending creation.
pub enum Slot<T: Clone> {
    Pending(Deferred<T>),
    Resolved(T),
}

impl<T: Clone> Slot<T> {
    /// Whether the slot still waits on a deferred creation.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The concrete value, if the slot has been resolved.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    /// Promote a pending slot whose creation has already completed.
    ///
    /// Returns `Ok(true)` once the slot holds a concrete value.
    ///
    /// # Errors
    /// Returns the creation error if the deferred creation failed.
    pub fn settle_now(&mut self) -> Result<bool, CreationError> {
        if let Self::Pending(deferred) = self {
            match deferred.clone().now_or_never() {
                Some(result) => *self = Self::Resolved(result?),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl<T: Clone> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(_) => f.write_str("Pending"),
            Self::Resolved(_) => f.write_str("Resolved"),
        }
    }
}

/// Append-only pool for a single resource type.
pub struct Pool<T: Clone> {
    tag: ResourceTag,
    slots: Vec<Slot<T>>,
}

impl<T: Clone> Pool<T> {
    pub const fn new(tag: ResourceTag) -> Self {
        Self {
            tag,
            slots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots still waiting on a deferred creation.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_pending()).count()
    }

    /// Append a concrete value and return its handle.
    pub fn push(&mut self, value: T) -> u32 {
        self.push_slot(Slot::Resolved(value))
    }

    /// Append a deferred creation and return its handle.
    pub fn push_deferred(&mut self, deferred: Deferred<T>) -> u32 {
        self.push_slot(Slot::Pending(deferred))
    }

    /// Append a slot. The handle is the pool length before the push.
    pub fn push_slot(&mut self, slot: Slot<T>) -> u32 {
        let index = self.slots.len() as u32;
        self.slots.push(slot);
        index
    }

    /// Look up a slot without touching its state.
    ///
    /// # Errors
    /// Returns an error if `index` was never handed out by this pool.
    pub fn get(&self, index: u32) -> AnyResult<&Slot<T>> {
        self.slots.get(index as usize).ok_or_else(|| {
            anyhow!(
                "{} handle {index} out of range (pool holds {})",
                self.tag,
                self.slots.len()
            )
        })
    }

    /// Look up a slot, promoting it first if its creation already completed.
    ///
    /// # Errors
    /// Returns an error for an unknown handle or a failed creation.
    pub fn settled(&mut self, index: u32) -> AnyResult<&Slot<T>> {
        let tag = self.tag;
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or_else(|| anyhow!("{tag} handle {index} out of range (pool holds {len})"))?;
        slot.settle_now()
            .map_err(|err| anyhow!("{tag} handle {index} failed to resolve: {err:#}"))?;
        Ok(slot)
    }

    /// Look up the concrete value behind a handle.
    ///
    /// # Errors
    /// Returns an error for an unknown handle, a failed creation, or a slot
    /// whose creation has not completed yet.
    pub fn resolved(&mut self, index: u32) -> AnyResult<&T> {
        let tag = self.tag;
        self.settled(index)?
            .value()
            .ok_or_else(|| anyhow!("{tag} handle {index} is still pending"))
    }

    /// Await every pending slot in handle order and rewrite it in place.
    ///
    /// Returns how many slots were resolved; a pool without pending slots
    /// resolves nothing.
    ///
    /// # Errors
    /// Returns the first creation error, naming the failing handle.
    pub async fn resolve_pending(&mut self) -> AnyResult<usize> {
        let tag = self.tag;
        let mut resolved = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Pending(deferred) = slot {
                let value = deferred
                    .clone()
                    .await
                    .map_err(|err| anyhow!("{tag} handle {index} failed to resolve: {err:#}"))?;
                *slot = Slot::Resolved(value);
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}

/// All pools of a session, one per resource type the module can create.
pub struct HandleRegistry {
    buffers: Pool<Arc<Buffer>>,
    pipelines: Pool<Arc<RenderPipeline>>,
    bind_groups: Pool<Arc<BindGroup>>,
}

impl HandleRegistry {
    pub const fn new() -> Self {
        Self {
            buffers: Pool::new(ResourceTag::Buffer),
            pipelines: Pool::new(ResourceTag::RenderPipeline),
            bind_groups: Pool::new(ResourceTag::BindGroup),
        }
    }

    pub const fn buffers(&self) -> &Pool<Arc<Buffer>> {
        &self.buffers
    }

    pub const fn buffers_mut(&mut self) -> &mut Pool<Arc<Buffer>> {
        &mut self.buffers
    }

    pub const fn pipelines(&self) -> &Pool<Arc<RenderPipeline>> {
        &self.pipelines
    }

    pub const fn pipelines_mut(&mut self) -> &mut Pool<Arc<RenderPipeline>> {
        &mut self.pipelines
    }

    pub const fn bind_groups(&self) -> &Pool<Arc<BindGroup>> {
        &self.bind_groups
    }

    pub const fn bind_groups_mut(&mut self) -> &mut Pool<Arc<BindGroup>> {
        &mut self.bind_groups
    }

    /// Pending slots across every pool.
    pub fn pending_count(&self) -> usize {
        self.buffers.pending_count()
            + self.pipelines.pending_count()
            + self.bind_groups.pending_count()
    }

    /// Resolve every pending slot in every pool.
    ///
    /// Pipelines go first; bind groups await their pipeline regardless, so
    /// the order only affects which failure is reported first.
    ///
    /// # Errors
    /// Returns the first creation error encountered.
    pub async fn resolve_pending(&mut self) -> AnyResult<usize> {
        let mut resolved = self.pipelines.resolve_pending().await?;
        resolved += self.bind_groups.resolve_pending().await?;
        resolved += self.buffers.resolve_pending().await?;
        Ok(resolved)
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Tests fail loudly on unexpected errors"
)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use pollster::block_on;

    fn from_channel(receiver: oneshot::Receiver<u32>) -> Deferred<u32> {
        defer(async move {
            receiver
                .await
                .map_err(|err| Arc::new(anyhow!("sender dropped: {err}")))
        })
    }

    #[test]
    fn push_returns_dense_indices() {
        let mut pool = Pool::new(ResourceTag::Buffer);
        for expected in 0..16_u32 {
            assert_eq!(pool.push(expected * 10), expected);
        }
        for index in 0..16_u32 {
            assert_eq!(*pool.resolved(index).unwrap(), index * 10);
        }
        assert_eq!(pool.len(), 16);
    }

    #[test]
    fn out_of_range_lookup_is_an_error() {
        let mut pool = Pool::new(ResourceTag::Sampler);
        pool.push(7_u32);
        let err = pool.get(3).unwrap_err();
        assert!(err.to_string().contains("sampler handle 3 out of range"));
        assert!(pool.resolved(1).is_err());
    }

    #[test]
    fn pending_slot_is_not_resolved_until_sender_fires() {
        let mut pool = Pool::new(ResourceTag::RenderPipeline);
        let (sender, receiver) = oneshot::channel();
        let handle = pool.push_deferred(from_channel(receiver));

        let err = pool.resolved(handle).unwrap_err();
        assert!(err.to_string().contains("still pending"));
        assert_eq!(pool.pending_count(), 1);

        sender.send(42).unwrap();
        assert_eq!(*pool.resolved(handle).unwrap(), 42);
        assert_eq!(pool.pending_count(), 0);
    }

    #[test]
    fn barrier_resolves_everything_and_is_idempotent() {
        let mut pool = Pool::new(ResourceTag::BindGroup);
        pool.push(1_u32);
        pool.push_deferred(defer(async { Ok(2) }));
        pool.push_deferred(defer(async { Ok(3) }));

        assert_eq!(block_on(pool.resolve_pending()).unwrap(), 2);
        assert_eq!(pool.pending_count(), 0);
        assert!((0..3).all(|index| pool.get(index).unwrap().value().is_some()));

        assert_eq!(block_on(pool.resolve_pending()).unwrap(), 0);
        assert_eq!(*pool.resolved(2).unwrap(), 3);
    }

    #[test]
    fn dependent_creation_follows_its_dependency() {
        let mut pipelines = Pool::new(ResourceTag::RenderPipeline);
        let mut bind_groups = Pool::new(ResourceTag::BindGroup);

        let (sender, receiver) = oneshot::channel();
        let pipeline = pipelines.push_deferred(from_channel(receiver));

        let Slot::Pending(layout_source) = pipelines.get(pipeline).unwrap() else {
            panic!("pipeline should still be pending");
        };
        let layout_source = layout_source.clone();
        let bind_group = bind_groups.push_deferred(defer(async move {
            let layout = layout_source.await?;
            Ok::<_, CreationError>(layout + 100)
        }));

        assert!(!bind_groups.get_mut_for_test(bind_group).settle_now().unwrap());

        sender.send(5).unwrap();
        assert_eq!(*bind_groups.resolved(bind_group).unwrap(), 105);
        assert_eq!(*pipelines.resolved(pipeline).unwrap(), 5);
    }

    #[test]
    fn failed_creation_reports_the_handle() {
        let mut pool: Pool<u32> = Pool::new(ResourceTag::RenderPipeline);
        pool.push_deferred(defer(async { Err(Arc::new(anyhow!("shader did not compile"))) }));
        let err = block_on(pool.resolve_pending()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("render pipeline handle 0"));
        assert!(message.contains("shader did not compile"));
    }

    #[test]
    fn empty_registry_has_nothing_pending() {
        let mut registry = HandleRegistry::new();
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(block_on(registry.resolve_pending()).unwrap(), 0);
        assert!(registry.buffers().is_empty());
    }

    impl<T: Clone> Pool<T> {
        fn get_mut_for_test(&mut self, index: u32) -> &mut Slot<T> {
            &mut self.slots[index as usize]
        }
    }
}
