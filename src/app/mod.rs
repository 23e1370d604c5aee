pub mod input_state;

use std::sync::Arc;
use std::time::Instant;
use color_eyre::Result;
use glam::{Mat4, Vec3};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::input_state::InputState;
use crate::renderer::config::RenderConfig;
use crate::renderer::shader_data::{LightData, ObjectTransforms, SceneTransforms};
use crate::renderer::{Engine, PIPELINE_SOLID, PIPELINE_TEXTURED};

const CUBE_MESH_PATH: &str = "assets/cube.obj";
const SUZANNE_MESH_PATH: &str = "assets/suzanne.obj";
const DEFAULT_TEXTURE_PATH: &str = "textures/default.jpg";
const BRICK_TEXTURE_PATH: &str = "textures/brick.jpg";

pub struct App {
    window: Option<Arc<Window>>,
    engine: Option<Engine>,
    config: RenderConfig,

    // State
    input_state: InputState,
    prev_frame_time: Instant,
    delta_time_secs: f32,
}

impl App {
    pub fn new() -> Result<Self> {
        Ok(Self {
            window: None,
            engine: None,
            config: RenderConfig::default(),

            input_state: InputState::default(),
            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;
        Ok(())
    }
}

/// The demo scene: two meshes, two textures, one object per pipeline,
/// side by side.
fn setup_scene(engine: &mut Engine, aspect_ratio: f32) -> Result<()> {
    let mut perspective = Mat4::perspective_rh(60.0_f32.to_radians(), aspect_ratio, 0.1, 100.0);
    // Vulkan clip space has Y pointing down
    perspective.y_axis.y *= -1.0;
    engine.set_projection(SceneTransforms {
        model: Mat4::IDENTITY,
        view: Mat4::IDENTITY,
        perspective,
    });
    engine.set_light(LightData::default())?;

    let cube = engine.load_mesh(CUBE_MESH_PATH)?;
    let suzanne = engine.load_mesh(SUZANNE_MESH_PATH)?;
    let default_texture = engine.load_texture(DEFAULT_TEXTURE_PATH)?;
    let brick_texture = engine.load_texture(BRICK_TEXTURE_PATH)?;

    let cube_transforms = ObjectTransforms {
        translation: Mat4::from_translation(Vec3::new(2.0, 0.0, -4.0)),
        ..Default::default()
    };
    engine.add_object(cube_transforms, default_texture, cube, PIPELINE_TEXTURED)?;

    let suzanne_transforms = ObjectTransforms {
        translation: Mat4::from_translation(Vec3::new(-2.0, 0.0, -4.0)),
        ..Default::default()
    };
    engine.add_object(suzanne_transforms, brick_texture, suzanne, PIPELINE_SOLID)?;

    Ok(())
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time
            .duration_since(self.prev_frame_time)
            .as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attributes = Window::default_attributes()
                .with_title(self.config.window_title.clone())
                .with_inner_size(PhysicalSize::new(
                    self.config.window_width,
                    self.config.window_height,
                ));
            self.window = Some(Arc::new(
                event_loop.create_window(attributes).unwrap()
            ));
        }

        if self.engine.is_none() {
            let window = self.window.as_ref().unwrap().clone();
            let mut engine = Engine::new(window, &self.config).unwrap();
            let aspect_ratio =
                self.config.window_width as f32 / self.config.window_height as f32;
            setup_scene(&mut engine, aspect_ratio).unwrap();
            self.engine = Some(engine);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if window_id != self.window.as_ref().unwrap().id() {
            return;
        }

        self.input_state.process_window_event(&event);

        if let WindowEvent::RedrawRequested = event {
            let engine = self.engine.as_mut().unwrap();
            engine.process_input(&self.input_state, self.delta_time_secs);
            if engine.is_running() {
                engine.draw_frame(self.delta_time_secs).unwrap();
            } else {
                event_loop.exit();
            }
            self.input_state.reset_frame();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.as_mut() {
            engine.destroy().unwrap();
        }
    }
}
