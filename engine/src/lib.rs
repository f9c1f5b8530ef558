use anyhow::{Ok, Result};
use log::error;
use renderer::Renderer;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

pub mod renderer;
pub mod vulkan;

#[derive(Debug)]
pub struct Engine {
    window: Window,
    renderer: Renderer,
    event_loop: EventLoop<()>,
}

impl Engine {
    pub fn new() -> Result<Engine> {
        // Window
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title("Meridian")
            .with_inner_size(LogicalSize::new(1024, 768))
            .build(&event_loop)?;

        let renderer = unsafe { Renderer::create(&window)? };

        Ok(Engine {
            window,
            renderer,
            event_loop,
        })
    }

    pub fn run(mut self) -> Result<()> {
        // A frame-loop failure exits the loop and is surfaced to the caller
        // once the event loop has wound down.
        let mut failure = None;

        self.event_loop.run(|event, elwt| {
            match event {
                // Request a redraw when all events were processed.
                Event::AboutToWait => self.window.request_redraw(),
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::RedrawRequested if !elwt.exiting() => {
                        if let Err(err) = unsafe { self.renderer.render(&self.window) } {
                            error!("Frame failed: {}", err);
                            failure = Some(err);
                            elwt.exit();
                            unsafe {
                                self.renderer.destroy();
                            }
                        }
                    }
                    WindowEvent::Resized(_) => self.renderer.notify_resize(),
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                        unsafe {
                            self.renderer.destroy();
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        })?;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
