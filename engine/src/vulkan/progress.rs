//! Tracks which initialization stages have completed, so that later stages
//! can assert their preconditions and teardown can destroy exactly the
//! resources that were actually created.

/// One entry per resource-producing initialization stage, in creation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Initialized,
    InstanceCreated,
    SurfaceCreated,
    PhysicalDeviceSelected,
    DeviceCreated,
    SwapchainCreated,
    ImageViewsCreated,
    CommandBuffersAllocated,
    RenderPassCreated,
    DepthResourcesCreated,
    FramebuffersCreated,
    VertexInputUploaded,
    PipelineCreated,
    SyncObjectsCreated,
}

impl Stage {
    pub const ALL: [Stage; 14] = [
        Stage::Initialized,
        Stage::InstanceCreated,
        Stage::SurfaceCreated,
        Stage::PhysicalDeviceSelected,
        Stage::DeviceCreated,
        Stage::SwapchainCreated,
        Stage::ImageViewsCreated,
        Stage::CommandBuffersAllocated,
        Stage::RenderPassCreated,
        Stage::DepthResourcesCreated,
        Stage::FramebuffersCreated,
        Stage::VertexInputUploaded,
        Stage::PipelineCreated,
        Stage::SyncObjectsCreated,
    ];
}

/// Lifecycle of the resource a stage produces. A stage moves to `Created`
/// only after its resource is fully constructed and bound, never
/// speculatively, and to `Destroyed` once its destructor has run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResourceState {
    #[default]
    Uninitialized,
    Created,
    Destroyed,
}

#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    states: [ResourceState; Stage::ALL.len()],
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_created(&mut self, stage: Stage) {
        self.states[stage as usize] = ResourceState::Created;
    }

    pub fn mark_destroyed(&mut self, stage: Stage) {
        self.states[stage as usize] = ResourceState::Destroyed;
    }

    pub fn is_created(&self, stage: Stage) -> bool {
        self.states[stage as usize] == ResourceState::Created
    }

    pub fn state(&self, stage: Stage) -> ResourceState {
        self.states[stage as usize]
    }

    /// Precondition guard between stages. A dependent stage must only run
    /// once everything it relies on has fully completed.
    pub fn assert_created(&self, stage: Stage) {
        debug_assert!(
            self.is_created(stage),
            "stage {:?} used before it completed",
            stage
        );
    }

    /// Runs `destroy` if and only if the stage's resource is currently
    /// created, then marks it destroyed. Never-created and already-destroyed
    /// stages are skipped, which makes teardown idempotent and safe after a
    /// partial initialization failure.
    pub fn destroy_if_created(&mut self, stage: Stage, destroy: impl FnOnce()) {
        if self.is_created(stage) {
            destroy();
            self.mark_destroyed(stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn stages_start_uninitialized() {
        let tracker = ProgressTracker::new();
        for stage in Stage::ALL {
            assert_eq!(tracker.state(stage), ResourceState::Uninitialized);
            assert!(!tracker.is_created(stage));
        }
    }

    #[test]
    fn mark_created_is_per_stage() {
        let mut tracker = ProgressTracker::new();
        tracker.mark_created(Stage::SwapchainCreated);

        assert!(tracker.is_created(Stage::SwapchainCreated));
        assert!(!tracker.is_created(Stage::ImageViewsCreated));
        assert!(!tracker.is_created(Stage::InstanceCreated));
    }

    #[test]
    #[should_panic(expected = "used before it completed")]
    fn dependent_stage_trips_the_guard_when_run_out_of_order() {
        // Framebuffers depend on the render pass; running them first must
        // hit the tracker's precondition check, not a driver fault.
        let mut tracker = ProgressTracker::new();
        tracker.mark_created(Stage::SwapchainCreated);
        tracker.mark_created(Stage::ImageViewsCreated);

        tracker.assert_created(Stage::RenderPassCreated);
    }

    #[test]
    fn guard_passes_once_the_dependency_completed() {
        let mut tracker = ProgressTracker::new();
        tracker.mark_created(Stage::RenderPassCreated);

        tracker.assert_created(Stage::RenderPassCreated);
    }

    #[test]
    fn destroy_skips_never_created_stages() {
        let mut tracker = ProgressTracker::new();
        let ran = Cell::new(false);

        tracker.destroy_if_created(Stage::PipelineCreated, || ran.set(true));

        assert!(!ran.get());
        assert_eq!(tracker.state(Stage::PipelineCreated), ResourceState::Uninitialized);
    }

    #[test]
    fn destroy_runs_exactly_once() {
        let mut tracker = ProgressTracker::new();
        tracker.mark_created(Stage::PipelineCreated);
        let runs = Cell::new(0);

        tracker.destroy_if_created(Stage::PipelineCreated, || runs.set(runs.get() + 1));
        tracker.destroy_if_created(Stage::PipelineCreated, || runs.set(runs.get() + 1));

        assert_eq!(runs.get(), 1);
        assert_eq!(tracker.state(Stage::PipelineCreated), ResourceState::Destroyed);
    }

    #[test]
    fn recreation_after_destroy_is_tracked() {
        let mut tracker = ProgressTracker::new();
        tracker.mark_created(Stage::SwapchainCreated);
        tracker.destroy_if_created(Stage::SwapchainCreated, || {});
        assert!(!tracker.is_created(Stage::SwapchainCreated));

        // A rebuild (resize protocol) marks the stage created again.
        tracker.mark_created(Stage::SwapchainCreated);
        assert!(tracker.is_created(Stage::SwapchainCreated));
    }

    #[test]
    fn partial_failure_teardown_only_touches_created_stages() {
        // Simulate init failing after the swapchain stage: everything up to
        // and including it is created, nothing later is.
        let mut tracker = ProgressTracker::new();
        for stage in &Stage::ALL[..=Stage::SwapchainCreated as usize] {
            tracker.mark_created(*stage);
        }

        let destroyed = Cell::new(0);
        for stage in Stage::ALL.iter().rev() {
            tracker.destroy_if_created(*stage, || destroyed.set(destroyed.get() + 1));
        }

        assert_eq!(destroyed.get(), Stage::SwapchainCreated as usize + 1);
        for stage in &Stage::ALL[..=Stage::SwapchainCreated as usize] {
            assert_eq!(tracker.state(*stage), ResourceState::Destroyed);
        }
        for stage in &Stage::ALL[Stage::SwapchainCreated as usize + 1..] {
            assert_eq!(tracker.state(*stage), ResourceState::Uninitialized);
        }
    }
}
