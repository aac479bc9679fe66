//! Per-frame drawing protocol.
//!
//! [`FrameLoop`] owns the host-side bookkeeping (frame slot rotation, image
//! ownership, rebuild requests) and drives a [`FrameBackend`] that performs
//! the actual waits, submissions and presentation.

use std::time::Instant;

use ember_core::{Camera, UniformBufferObject};
use ember_gpu::{GpuError, Result};

/// Default number of frames the host may record ahead of the GPU.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Outcome of one [`FrameLoop::draw_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and queued for presentation.
    Presented,
    /// The swapchain was out of date; it was rebuilt and nothing was drawn.
    Rebuilt,
    /// The framebuffer has no area; nothing was drawn. Wait for window events.
    Parked,
}

/// GPU operations the frame loop sequences.
///
/// `slot` indexes frame-in-flight synchronization objects; `image` indexes
/// swapchain images and everything created per image.
pub trait FrameBackend {
    /// Current framebuffer size reported by the surface provider.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Number of swapchain images.
    fn image_count(&self) -> usize;

    /// Swapchain extent in pixels.
    fn extent(&self) -> (u32, u32);

    /// Block until the slot's previous submission has finished.
    fn wait_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore.
    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire(&mut self, slot: usize) -> Result<(usize, bool)>;

    /// Write the per-image uniform buffer.
    fn write_uniforms(&mut self, image: usize, ubo: &UniformBufferObject) -> Result<()>;

    /// Unsignal the slot's fence before resubmitting.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Submit the image's pre-recorded commands using the slot's semaphores and fence.
    fn submit(&mut self, slot: usize, image: usize) -> Result<()>;

    /// Present the image once the slot's render-finished semaphore signals.
    fn present(&mut self, slot: usize, image: usize) -> Result<()>;

    /// Wait for the device to go idle and replace every swapchain-dependent object.
    fn rebuild(&mut self) -> Result<()>;
}

/// Frame timing summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub rebuilds: u64,
    pub min_fps: f64,
    pub max_fps: f64,
    pub avg_fps: f64,
}

/// Host-side state of the drawing protocol.
pub struct FrameLoop {
    frames_in_flight: usize,
    slot: usize,
    /// Slot whose fence guards each swapchain image, if any.
    images_in_flight: Vec<Option<usize>>,
    resized: bool,
    rebuild_pending: bool,
    camera: Camera,
    start: Option<Instant>,
    last_frame: Option<Instant>,
    frame_count: u64,
    rebuild_count: u64,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    fps_samples: u64,
}

impl FrameLoop {
    /// Create the loop for a swapchain with `image_count` images.
    pub fn new(frames_in_flight: usize, image_count: usize, camera: Camera) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            slot: 0,
            images_in_flight: vec![None; image_count],
            resized: false,
            rebuild_pending: false,
            camera,
            start: None,
            last_frame: None,
            frame_count: 0,
            rebuild_count: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            fps_samples: 0,
        }
    }

    /// Record that the surface provider reported a resize.
    pub fn notify_resized(&mut self) {
        self.resized = true;
    }

    /// Frame slot the next draw will use.
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    /// Whether a rebuild will run at the start of the next draw.
    pub fn rebuild_requested(&self) -> bool {
        self.resized || self.rebuild_pending
    }

    /// Draw one frame.
    ///
    /// Recoverable swapchain errors are absorbed into a rebuild; all other
    /// errors are returned.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B, now: Instant) -> Result<FrameStatus> {
        if self.rebuild_requested() && self.rebuild(backend)? == FrameStatus::Parked {
            return Ok(FrameStatus::Parked);
        }

        let slot = self.slot;
        backend.wait_slot(slot)?;

        let (image, suboptimal) = match backend.acquire(slot) {
            Ok(acquired) => acquired,
            Err(GpuError::SwapchainOutOfDate) => {
                tracing::debug!("Swapchain out of date on acquire");
                return self.rebuild(backend);
            }
            Err(e) => return Err(e),
        };
        if suboptimal {
            self.rebuild_pending = true;
        }

        if let Some(owner) = self.images_in_flight[image] {
            if owner != slot {
                backend.wait_slot(owner)?;
            }
        }
        self.images_in_flight[image] = Some(slot);

        let start = *self.start.get_or_insert(now);
        let seconds = now.saturating_duration_since(start).as_secs_f32();
        let (width, height) = backend.extent();
        let ubo = UniformBufferObject::at_time(&self.camera, seconds, width, height);
        backend.write_uniforms(image, &ubo)?;

        backend.reset_slot(slot)?;
        backend.submit(slot, image)?;

        match backend.present(slot, image) {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                tracing::debug!("Present reported {e}; rebuilding before the next frame");
                self.rebuild_pending = true;
            }
            Err(e) => return Err(e),
        }

        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.record_timing(now);
        Ok(FrameStatus::Presented)
    }

    /// Replace the swapchain bundle, or park while the framebuffer has no area.
    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameStatus> {
        let (width, height) = backend.framebuffer_size();
        if width == 0 || height == 0 {
            self.rebuild_pending = true;
            return Ok(FrameStatus::Parked);
        }

        backend.rebuild()?;

        self.images_in_flight = vec![None; backend.image_count()];
        self.resized = false;
        self.rebuild_pending = false;
        self.rebuild_count += 1;

        let (width, height) = backend.extent();
        tracing::info!("Swapchain rebuilt at {}x{}", width, height);
        Ok(FrameStatus::Rebuilt)
    }

    fn record_timing(&mut self, now: Instant) {
        self.frame_count += 1;
        if let Some(last) = self.last_frame.replace(now) {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let fps = 1.0 / dt;
                self.min_fps = self.min_fps.min(fps);
                self.max_fps = self.max_fps.max(fps);
                self.fps_sum += fps;
                self.fps_samples += 1;
            }
        }
    }

    /// Frame counts and rates so far.
    pub fn stats(&self) -> FrameStats {
        if self.fps_samples == 0 {
            return FrameStats {
                frames: self.frame_count,
                rebuilds: self.rebuild_count,
                ..FrameStats::default()
            };
        }
        FrameStats {
            frames: self.frame_count,
            rebuilds: self.rebuild_count,
            min_fps: self.min_fps,
            max_fps: self.max_fps,
            avg_fps: self.fps_sum / self.fps_samples as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::f32::consts::FRAC_PI_2;
    use std::time::Duration;

    use approx::assert_relative_eq;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Submit(usize, usize),
        Present(usize, usize),
        Rebuild,
    }

    /// Long-lived resources, uploaded once when the backend is created.
    struct FakeScene {
        uploads: usize,
    }

    impl FakeScene {
        fn upload() -> Self {
            Self { uploads: 1 }
        }
    }

    /// Backend that records calls and tracks fence state per slot.
    struct FakeBackend {
        scene: FakeScene,
        /// Swapchain bundles built so far, including the initial one.
        bundle_builds: usize,
        /// Image counts the next rebuilds report, oldest first.
        next_image_counts: VecDeque<usize>,
        framebuffer: (u32, u32),
        image_count: usize,
        extent: (u32, u32),
        next_image: usize,
        acquire_order: VecDeque<usize>,
        acquire_errors: VecDeque<GpuError>,
        present_errors: VecDeque<GpuError>,
        /// Fence signaled per slot.
        signaled: Vec<bool>,
        /// Uniforms written per image since the current bundle was built.
        uniforms: Vec<Option<UniformBufferObject>>,
        /// Extent of the swapchain generation each submit was issued against.
        submitted_generation: Vec<u64>,
        generation: u64,
        calls: Vec<Call>,
    }

    impl FakeBackend {
        fn new(frames: usize, images: usize) -> Self {
            Self {
                scene: FakeScene::upload(),
                bundle_builds: 1,
                next_image_counts: VecDeque::new(),
                framebuffer: (800, 600),
                image_count: images,
                extent: (800, 600),
                next_image: 0,
                acquire_order: VecDeque::new(),
                acquire_errors: VecDeque::new(),
                present_errors: VecDeque::new(),
                signaled: vec![true; frames],
                uniforms: vec![None; images],
                submitted_generation: Vec::new(),
                generation: 0,
                calls: Vec::new(),
            }
        }

        fn submits(&self) -> Vec<(usize, usize)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Submit(slot, image) => Some((*slot, *image)),
                    _ => None,
                })
                .collect()
        }

        fn rebuilds(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Rebuild).count()
        }
    }

    impl FrameBackend for FakeBackend {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.framebuffer
        }

        fn image_count(&self) -> usize {
            self.image_count
        }

        fn extent(&self) -> (u32, u32) {
            self.extent
        }

        fn wait_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            // The GPU finishes instantly once waited on.
            self.signaled[slot] = true;
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<(usize, bool)> {
            self.calls.push(Call::Acquire(slot));
            if let Some(e) = self.acquire_errors.pop_front() {
                return Err(e);
            }
            let image = self.acquire_order.pop_front().unwrap_or_else(|| {
                let image = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                image
            });
            Ok((image, false))
        }

        fn write_uniforms(&mut self, image: usize, ubo: &UniformBufferObject) -> Result<()> {
            assert!(image < self.image_count, "stale image index {image}");
            self.uniforms[image] = Some(*ubo);
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            assert!(self.signaled[slot], "slot {slot} reset while in flight");
            self.calls.push(Call::Reset(slot));
            self.signaled[slot] = false;
            Ok(())
        }

        fn submit(&mut self, slot: usize, image: usize) -> Result<()> {
            assert!(!self.signaled[slot], "slot {slot} submitted without reset");
            assert!(image < self.image_count, "stale image index {image}");
            assert!(self.uniforms[image].is_some(), "image {image} submitted without uniforms");
            self.calls.push(Call::Submit(slot, image));
            self.submitted_generation.push(self.generation);
            Ok(())
        }

        fn present(&mut self, slot: usize, image: usize) -> Result<()> {
            self.calls.push(Call::Present(slot, image));
            match self.present_errors.pop_front() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn rebuild(&mut self) -> Result<()> {
            assert!(self.framebuffer.0 > 0 && self.framebuffer.1 > 0);
            self.calls.push(Call::Rebuild);
            self.generation += 1;
            self.bundle_builds += 1;
            if let Some(count) = self.next_image_counts.pop_front() {
                self.image_count = count;
            }
            self.extent = self.framebuffer;
            self.next_image = 0;
            self.uniforms = vec![None; self.image_count];
            self.signaled.iter_mut().for_each(|s| *s = true);
            Ok(())
        }
    }

    fn frame_loop(frames: usize, images: usize) -> FrameLoop {
        FrameLoop::new(frames, images, Camera::default())
    }

    #[test]
    fn slots_rotate_round_robin() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let t0 = Instant::now();

        for k in 0..10 {
            assert_eq!(frames.current_slot(), k % 2);
            let status = frames
                .draw_frame(&mut backend, t0 + Duration::from_millis(16 * k as u64))
                .unwrap();
            assert_eq!(status, FrameStatus::Presented);
        }

        let submits = backend.submits();
        assert_eq!(submits.len(), 10);
        for (k, (slot, image)) in submits.into_iter().enumerate() {
            assert_eq!(slot, k % 2);
            assert_eq!(image, k % 3);
        }
    }

    #[test]
    fn each_slot_waits_before_resetting_its_fence() {
        let mut backend = FakeBackend::new(2, 2);
        let mut frames = frame_loop(2, 2);
        let now = Instant::now();

        frames.draw_frame(&mut backend, now).unwrap();
        frames.draw_frame(&mut backend, now).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
                Call::Wait(1),
                Call::Acquire(1),
                Call::Reset(1),
                Call::Submit(1, 1),
                Call::Present(1, 1),
            ]
        );
    }

    #[test]
    fn out_of_order_image_waits_on_owning_slot() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let now = Instant::now();

        // Slot 0 takes image 0; slot 1 is handed image 0 again.
        backend.acquire_order.extend([0, 0]);
        frames.draw_frame(&mut backend, now).unwrap();
        backend.calls.clear();
        frames.draw_frame(&mut backend, now).unwrap();

        assert_eq!(
            &backend.calls[..3],
            &[Call::Wait(1), Call::Acquire(1), Call::Wait(0)]
        );
        assert_eq!(backend.submits(), vec![(1, 0)]);
    }

    #[test]
    fn first_fence_waited_before_second_submit() {
        let mut backend = FakeBackend::new(1, 2);
        let mut frames = frame_loop(1, 2);
        let now = Instant::now();

        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);
        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);

        let second_submit = backend
            .calls
            .iter()
            .rposition(|c| matches!(c, Call::Submit(..)))
            .unwrap();
        let wait_before = backend.calls[..second_submit]
            .iter()
            .rposition(|c| *c == Call::Wait(0))
            .unwrap();
        let first_submit = backend
            .calls
            .iter()
            .position(|c| matches!(c, Call::Submit(..)))
            .unwrap();
        assert!(first_submit < wait_before);
    }

    #[test]
    fn model_rotates_a_quarter_turn_after_one_second() {
        let mut backend = FakeBackend::new(2, 2);
        let mut frames = frame_loop(2, 2);
        let t0 = Instant::now();

        frames.draw_frame(&mut backend, t0).unwrap();
        let first = backend.uniforms[0].unwrap();
        assert_eq!(first.model_matrix(), glam::Mat4::IDENTITY);

        frames
            .draw_frame(&mut backend, t0 + Duration::from_secs(1))
            .unwrap();
        let ubo = backend.uniforms[1].unwrap();
        let x = ubo.model_matrix() * glam::Vec4::X;
        assert_relative_eq!(x.y.atan2(x.x), FRAC_PI_2, epsilon = 1e-4);
        assert_eq!(ubo.proj, Camera::default().projection_matrix(800.0 / 600.0).to_cols_array_2d());
    }

    #[test]
    fn out_of_date_acquire_rebuilds_without_reuploading() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let now = Instant::now();

        backend.acquire_errors.push_back(GpuError::SwapchainOutOfDate);
        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Rebuilt);
        assert_eq!(backend.rebuilds(), 1);
        assert!(backend.submits().is_empty());
        // Fence was not reset, so the same slot can be waited on again.
        assert_eq!(frames.current_slot(), 0);

        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);
        assert_eq!(backend.submits(), vec![(0, 0)]);
        assert_eq!(backend.bundle_builds, 2);
        assert_eq!(backend.scene.uploads, 1);
        assert_eq!(frames.stats().rebuilds, 1);
    }

    #[test]
    fn suboptimal_present_rebuilds_on_next_frame() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let now = Instant::now();

        backend.present_errors.push_back(GpuError::SwapchainSuboptimal);
        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);
        assert!(backend.calls.contains(&Call::Present(0, 0)));
        assert_eq!(backend.rebuilds(), 0);
        assert!(frames.rebuild_requested());

        backend.calls.clear();
        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);
        assert_eq!(backend.calls[0], Call::Rebuild);
        assert_eq!(backend.submits().len(), 1);
        assert!(!frames.rebuild_requested());
    }

    #[test]
    fn fatal_present_error_propagates() {
        let mut backend = FakeBackend::new(2, 2);
        let mut frames = frame_loop(2, 2);

        backend.present_errors.push_back(GpuError::DeviceLost);
        let err = frames.draw_frame(&mut backend, Instant::now()).unwrap_err();
        assert!(matches!(err, GpuError::DeviceLost));
    }

    #[test]
    fn minimized_window_parks_until_resized() {
        let mut backend = FakeBackend::new(2, 2);
        let mut frames = frame_loop(2, 2);
        let now = Instant::now();

        backend.framebuffer = (0, 0);
        frames.notify_resized();
        for _ in 0..3 {
            assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Parked);
        }
        assert!(backend.calls.is_empty());

        backend.framebuffer = (1024, 768);
        assert_eq!(frames.draw_frame(&mut backend, now).unwrap(), FrameStatus::Presented);
        assert_eq!(backend.rebuilds(), 1);
        assert_eq!(backend.extent, (1024, 768));
        assert_eq!(backend.submits().len(), 1);
    }

    #[test]
    fn random_resizes_never_draw_against_stale_swapchain() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let t0 = Instant::now();
        let sizes = [(640, 480), (0, 0), (0, 0), (1920, 1080), (1, 1), (0, 600), (300, 200)];

        let mut step = 0u64;
        for &size in &sizes {
            backend.framebuffer = size;
            frames.notify_resized();
            let generation_before = backend.generation;
            let submits_before = backend.submitted_generation.len();

            let status = frames
                .draw_frame(&mut backend, t0 + Duration::from_millis(step * 16))
                .unwrap();
            step += 1;

            if size.0 == 0 || size.1 == 0 {
                assert_eq!(status, FrameStatus::Parked);
                assert_eq!(backend.submitted_generation.len(), submits_before);
                assert_eq!(backend.generation, generation_before);
            } else {
                assert_eq!(status, FrameStatus::Presented);
                assert_eq!(backend.extent, size);
                assert_eq!(backend.generation, generation_before + 1);
                assert_eq!(
                    backend.submitted_generation.last().copied(),
                    Some(backend.generation)
                );
            }
        }

        assert_eq!(frames.images_in_flight.len(), backend.image_count);
        assert!(backend
            .submitted_generation
            .windows(2)
            .all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn rebuild_with_new_image_count_tracks_every_image() {
        let mut backend = FakeBackend::new(2, 3);
        let mut frames = frame_loop(2, 3);
        let t0 = Instant::now();
        let phases: [(usize, (u32, u32), &[usize]); 3] = [
            (3, (800, 600), &[2, 0, 1, 2]),
            (5, (1280, 720), &[4, 1, 3, 0, 4]),
            (2, (640, 480), &[1, 0, 1]),
        ];

        let mut step = 0u64;
        for (phase, &(image_count, size, order)) in phases.iter().enumerate() {
            if phase > 0 {
                backend.framebuffer = size;
                backend.next_image_counts.push_back(image_count);
                frames.notify_resized();
            }
            backend.acquire_order.extend(order.iter().copied());

            for _ in order {
                let status = frames
                    .draw_frame(&mut backend, t0 + Duration::from_millis(step * 16))
                    .unwrap();
                step += 1;
                assert_eq!(status, FrameStatus::Presented);
            }

            assert_eq!(backend.image_count, image_count);
            assert_eq!(backend.extent, size);
            assert_eq!(frames.images_in_flight.len(), image_count);
            let submits = backend.submits();
            let drawn: Vec<usize> = submits[submits.len() - order.len()..]
                .iter()
                .map(|&(_, image)| image)
                .collect();
            assert_eq!(drawn, order);
        }

        assert_eq!(backend.bundle_builds, 3);
        assert_eq!(backend.scene.uploads, 1);
        assert_eq!(frames.stats().rebuilds, 2);
    }

    #[test]
    fn stats_track_frame_rate() {
        let mut backend = FakeBackend::new(2, 2);
        let mut frames = frame_loop(2, 2);
        let t0 = Instant::now();

        assert_eq!(frames.stats(), FrameStats::default());
        for k in 0..5 {
            frames
                .draw_frame(&mut backend, t0 + Duration::from_millis(10 * k))
                .unwrap();
        }

        let stats = frames.stats();
        assert_eq!(stats.frames, 5);
        assert_relative_eq!(stats.avg_fps, 100.0, epsilon = 1e-6);
        assert_relative_eq!(stats.min_fps, 100.0, epsilon = 1e-6);
    }
}
