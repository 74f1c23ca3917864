// Renderer lifecycle
//
// Bootstrap is a strict chain: every stage consumes what the previous one
// produced. The renderer remembers the highest stage it reached and unwinds
// from there, newest first, on shutdown, on failure, and (for the swapchain
// dependent stages only) when the window changes size.

use ash::{vk, Entry};
use std::path::PathBuf;

use super::device::{self, LogicalDevice, PhysicalDeviceDescriptor, SelectedDevice};
use super::error::{BootstrapError, BootstrapResult};
use super::frame::FrameResources;
use super::instance::VulkanInstance;
use super::pipeline::{self, GraphicsPipeline};
use super::probe::SurfaceSupport;
use super::surface::{PresentationSurface, WindowTarget};
use super::swapchain::Swapchain;

/// Everything the bootstrap needs from the application's configuration
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub engine_name: String,
    pub enable_validation: bool,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub max_frames_in_flight: usize,
}

/// Bootstrap stages in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Uninitialized,
    InstanceReady,
    SurfaceReady,
    DeviceSelected,
    LogicalDeviceReady,
    SwapchainReady,
    RenderPassReady,
    PipelineReady,
    FrameResourcesReady,
}

impl Stage {
    pub const ORDER: [Stage; 9] = [
        Stage::Uninitialized,
        Stage::InstanceReady,
        Stage::SurfaceReady,
        Stage::DeviceSelected,
        Stage::LogicalDeviceReady,
        Stage::SwapchainReady,
        Stage::RenderPassReady,
        Stage::PipelineReady,
        Stage::FrameResourcesReady,
    ];

    pub fn previous(self) -> Option<Stage> {
        let index = Self::ORDER.iter().position(|&s| s == self)?;
        index.checked_sub(1).map(|i| Self::ORDER[i])
    }

    /// Stages above `floor` up to and including `self`, newest first
    pub fn unwind_sequence(self, floor: Stage) -> Vec<Stage> {
        let mut sequence = Vec::new();
        let mut current = self;
        while current > floor {
            sequence.push(current);
            match current.previous() {
                Some(previous) => current = previous,
                None => break,
            }
        }
        sequence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active(Stage),
    /// A stage failed after `reached` had been completed
    Failed { reached: Stage },
}

impl LifecycleState {
    pub fn reached(&self) -> Stage {
        match *self {
            LifecycleState::Active(stage) => stage,
            LifecycleState::Failed { reached } => reached,
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == LifecycleState::Active(Stage::FrameResourcesReady)
    }

    /// Record that `stage` finished. Ignored once failed.
    fn advance(&mut self, stage: Stage) {
        if let LifecycleState::Active(_) = self {
            log::debug!("Lifecycle: {:?}", stage);
            *self = LifecycleState::Active(stage);
        }
    }

    fn fail(&mut self) {
        *self = LifecycleState::Failed {
            reached: self.reached(),
        };
    }
}

/// Release every stage above `floor`, newest first, leaving the state at `floor`.
/// A second call with the same floor releases nothing.
pub fn unwind_to(state: &mut LifecycleState, floor: Stage, mut release: impl FnMut(Stage)) {
    for stage in state.reached().unwind_sequence(floor) {
        release(stage);
    }
    *state = LifecycleState::Active(floor.min(state.reached()));
}

/// Owner of the API instance and the logical device
pub struct GraphicsContext {
    entry: Entry,
    instance: Option<VulkanInstance>,
    device: Option<LogicalDevice>,
}

impl GraphicsContext {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            instance: None,
            device: None,
        }
    }

    pub fn device(&self) -> Option<&ash::Device> {
        self.device.as_ref().map(|logical| &logical.device)
    }
}

/// Objects that depend on the swapchain and are rebuilt with it
#[derive(Default)]
struct SwapchainChain {
    swapchain: Option<Swapchain>,
    render_pass: vk::RenderPass,
    pipeline: Option<GraphicsPipeline>,
    frames: Option<FrameResources>,
}

impl SwapchainChain {
    /// Swapchain through frame resources, advancing `state` after each stage
    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        state: &mut LifecycleState,
        instance: &ash::Instance,
        logical: &LogicalDevice,
        surface: &PresentationSurface,
        support: &SurfaceSupport,
        settings: &RendererSettings,
        framebuffer_size: vk::Extent2D,
    ) -> BootstrapResult<()> {
        let swapchain = self.swapchain.insert(Swapchain::new(
            instance,
            logical,
            surface,
            support,
            framebuffer_size,
        )?);
        state.advance(Stage::SwapchainReady);

        self.render_pass = pipeline::create_render_pass(&logical.device, swapchain.format())?;
        state.advance(Stage::RenderPassReady);

        self.pipeline = Some(GraphicsPipeline::new(
            &logical.device,
            self.render_pass,
            swapchain.extent(),
            &settings.vertex_shader,
            &settings.fragment_shader,
        )?);
        state.advance(Stage::PipelineReady);

        self.frames = Some(FrameResources::new(
            &logical.device,
            &swapchain.images,
            self.render_pass,
            swapchain.extent(),
            logical.queues.graphics,
            settings.max_frames_in_flight,
        )?);
        state.advance(Stage::FrameResourcesReady);

        Ok(())
    }
}

/// The bootstrapped renderer. Dropping it tears everything down.
pub struct Renderer {
    settings: RendererSettings,
    state: LifecycleState,
    context: GraphicsContext,
    surface: Option<PresentationSurface>,
    selected: Option<SelectedDevice>,
    chain: SwapchainChain,
}

impl Renderer {
    /// Run the full bootstrap chain against `window`.
    ///
    /// On failure, everything created so far is destroyed before the error
    /// is returned.
    pub fn init(window: &dyn WindowTarget, settings: RendererSettings) -> BootstrapResult<Self> {
        log::info!("Initializing renderer: {}", settings.app_name);

        let entry = unsafe { Entry::load() }?;
        let mut renderer = Self {
            settings,
            state: LifecycleState::Active(Stage::Uninitialized),
            context: GraphicsContext::new(entry),
            surface: None,
            selected: None,
            chain: SwapchainChain::default(),
        };

        match renderer.bootstrap(window) {
            Ok(()) => {
                log::info!("Renderer ready");
                Ok(renderer)
            }
            Err(e) => {
                renderer.state.fail();
                log::error!(
                    "Bootstrap failed after {:?}: {}",
                    renderer.state.reached(),
                    e
                );
                renderer.teardown();
                Err(e)
            }
        }
    }

    fn bootstrap(&mut self, window: &dyn WindowTarget) -> BootstrapResult<()> {
        let window_extensions = window.required_extensions()?;

        let instance = &self
            .context
            .instance
            .insert(VulkanInstance::new(
                &self.context.entry,
                &self.settings.app_name,
                &self.settings.engine_name,
                &window_extensions,
                self.settings.enable_validation,
            )?)
            .instance;
        self.state.advance(Stage::InstanceReady);

        let surface = self.surface.insert(PresentationSurface::bind(
            &self.context.entry,
            instance,
            window,
        )?);
        self.state.advance(Stage::SurfaceReady);

        let selected = self
            .selected
            .insert(device::select_physical_device(instance, surface)?);
        selected.descriptor.log_summary();
        self.state.advance(Stage::DeviceSelected);

        let logical = self
            .context
            .device
            .insert(LogicalDevice::new(instance, selected)?);
        self.state.advance(Stage::LogicalDeviceReady);

        self.chain.build(
            &mut self.state,
            instance,
            logical,
            surface,
            &selected.surface_support,
            &self.settings,
            window.framebuffer_size(),
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn physical_device(&self) -> Option<&PhysicalDeviceDescriptor> {
        self.selected.as_ref().map(|selected| &selected.descriptor)
    }

    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.chain.swapchain.as_ref().map(Swapchain::extent)
    }

    /// Rebuild swapchain, render pass, pipeline and frame resources for the
    /// window's current size. Returns `Ok(false)` when the window has no
    /// area and recreation has to wait.
    pub fn recreate_chain(&mut self, window: &dyn WindowTarget) -> BootstrapResult<bool> {
        let framebuffer_size = window.framebuffer_size();
        if framebuffer_size.width == 0 || framebuffer_size.height == 0 {
            log::debug!("Framebuffer has zero area, deferring swapchain recreation");
            return Ok(false);
        }
        if self.state.reached() < Stage::LogicalDeviceReady {
            return Ok(false);
        }

        self.wait_idle()?;
        self.unwind(Stage::LogicalDeviceReady);

        let (Some(instance), Some(logical), Some(surface), Some(selected)) = (
            self.context.instance.as_ref(),
            self.context.device.as_ref(),
            self.surface.as_ref(),
            self.selected.as_ref(),
        ) else {
            return Ok(false);
        };

        // Capabilities change with the window, so query them again
        let rebuilt = SurfaceSupport::query(surface, selected.descriptor.handle)
            .map_err(BootstrapError::from)
            .and_then(|support| {
                self.chain.build(
                    &mut self.state,
                    &instance.instance,
                    logical,
                    surface,
                    &support,
                    &self.settings,
                    framebuffer_size,
                )
            });

        if let Err(e) = rebuilt {
            self.state.fail();
            log::error!("Swapchain recreation failed: {}", e);
            return Err(e);
        }

        log::info!(
            "Swapchain recreated at {}x{}",
            framebuffer_size.width,
            framebuffer_size.height
        );
        Ok(true)
    }

    /// Per-frame entry point. No draw loop yet.
    pub fn draw(&mut self) -> BootstrapResult<()> {
        Ok(())
    }

    pub fn wait_idle(&self) -> BootstrapResult<()> {
        match self.context.device.as_ref() {
            Some(logical) => logical.wait_idle().map_err(BootstrapError::DeviceWait),
            None => Ok(()),
        }
    }

    /// Destroy everything, newest first. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.state.reached() == Stage::Uninitialized {
            return;
        }
        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }
        self.unwind(Stage::Uninitialized);
        log::info!("Renderer torn down");
    }

    fn unwind(&mut self, floor: Stage) {
        let mut state = self.state;
        unwind_to(&mut state, floor, |stage| self.release(stage));
        self.state = state;
    }

    fn release(&mut self, stage: Stage) {
        let device = self.context.device();

        match stage {
            Stage::FrameResourcesReady => {
                if let (Some(mut frames), Some(device)) = (self.chain.frames.take(), device) {
                    frames.destroy(device);
                }
            }
            Stage::PipelineReady => {
                if let (Some(mut pipeline), Some(device)) = (self.chain.pipeline.take(), device) {
                    pipeline.destroy(device);
                }
            }
            Stage::RenderPassReady => {
                if let Some(device) = device {
                    if self.chain.render_pass != vk::RenderPass::null() {
                        unsafe { device.destroy_render_pass(self.chain.render_pass, None) };
                    }
                }
                self.chain.render_pass = vk::RenderPass::null();
            }
            Stage::SwapchainReady => {
                if let (Some(mut swapchain), Some(device)) = (self.chain.swapchain.take(), device) {
                    swapchain.destroy(device);
                }
            }
            Stage::LogicalDeviceReady => {
                if let Some(logical) = self.context.device.take() {
                    logical.destroy();
                }
            }
            Stage::DeviceSelected => {
                self.selected = None;
            }
            Stage::SurfaceReady => {
                if let Some(mut surface) = self.surface.take() {
                    surface.destroy();
                }
            }
            Stage::InstanceReady => {
                if let Some(instance) = self.context.instance.take() {
                    instance.destroy();
                }
            }
            Stage::Uninitialized => {}
        }
        log::debug!("Released {:?}", stage);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.teardown();
    }
}
