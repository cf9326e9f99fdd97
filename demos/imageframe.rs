//! Image frame firmware: splash, connection info, then a slideshow.
//!
//! A single render task owns the panel and the image store and works through
//! display requests one at a time. It first lists the store on the debug
//! console. `main` mounts the flash image partition, writes the two bundled
//! images on first boot and then queues a playlist that also shows the
//! not-found and unsupported-format panels.

#![no_std]
#![no_main]

use defmt::{
    info,
    warn,
};
use embassy_executor::Spawner;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::Channel,
};
use embassy_time::{
    Duration,
    Timer,
};
use esp_backtrace as _;
use esp_hal::timer::timg::TimerGroup;
use esp_println as _;
use esp_storage::FlashStorage;
use tft_imageframe::{
    Backlight,
    Console,
    Display,
    FlashStore,
    ImageStore,
    Level,
    Outcome,
    Renderer,
    mk_static,
    split_resources,
    splash::{
        self,
        ConnectionInfo,
        SplashInfo,
    },
};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const GRADIENT_JPG: &[u8] = include_bytes!("assets/gradient.jpg");
const RINGS_PNG: &[u8] = include_bytes!("assets/rings.png");

type Store = FlashStore<FlashStorage<'static>>;

const PLAYLIST: [&str; 4] = ["gradient.jpg", "rings.png", "missing.jpg", "notes.txt"];

/// Work for the render task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
enum DisplayRequest {
    /// Show a stored image by bare name.
    Image(&'static str),
    /// Bring back the connection-info screen.
    ConnectionInfo,
}

static DISPLAY_REQUESTS: Channel<CriticalSectionRawMutex, DisplayRequest, 4> = Channel::new();

#[embassy_executor::task]
async fn render_task(
    display: &'static mut Display<'static>,
    backlight: &'static mut Backlight,
    renderer: &'static mut Renderer<Store>,
) {
    backlight.on();
    info!("Render task started");

    let mut console = Console::new();
    let _ = console.println(display, "Display ready", Level::Success);
    let store = renderer.store();
    let _ = console.log(
        display,
        Level::Info,
        format_args!("Images: {} of {} bytes used", store.usage(), store.capacity()),
    );
    for entry in store.list() {
        let _ = console.log(display, Level::Debug, format_args!("  {} ({} bytes)", entry.name, entry.size));
    }
    Timer::after(Duration::from_secs(2)).await;

    if splash::draw_splash(display, &SplashInfo::default()).is_err() {
        warn!("Splash screen failed");
    }
    for filled in (0..=splash::PROGRESS_MAX).step_by(10) {
        let _ = splash::draw_progress(display, filled);
        Timer::after(Duration::from_millis(100)).await;
    }
    let _ = splash::draw_ready(display);
    Timer::after(Duration::from_secs(1)).await;

    loop {
        match DISPLAY_REQUESTS.receive().await {
            DisplayRequest::Image(name) => {
                let outcome = renderer.display(display, name);
                if outcome != Outcome::Displayed {
                    warn!("{} not shown: {}", name, outcome);
                }
            }
            DisplayRequest::ConnectionInfo => {
                if splash::draw_connection_info(display, &ConnectionInfo::default()).is_err() {
                    warn!("Connection screen failed");
                }
            }
        }
    }
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    let peripherals = tft_imageframe::init();
    let resources = split_resources!(peripherals);

    esp_alloc::heap_allocator!(size: 72 * 1024);
    // Decoded JPEG frames live in PSRAM.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let mut store = tft_imageframe::image_store(peripherals.FLASH).unwrap();
    for (name, data) in [("gradient.jpg", GRADIENT_JPG), ("rings.png", RINGS_PNG)] {
        if store.exists(name) {
            continue;
        }
        if let Err(e) = store.write(name, data) {
            warn!("Could not store {}: {}", name, e);
        }
    }
    info!("Store holds {} of {} bytes", store.usage(), store.capacity());

    let display = mk_static!(Display<'static>, resources.display.into());
    let backlight = mk_static!(Backlight, resources.backlight.into());
    let renderer = mk_static!(Renderer<Store>, Renderer::new(store));
    spawner.must_spawn(render_task(display, backlight, renderer));

    DISPLAY_REQUESTS.send(DisplayRequest::ConnectionInfo).await;
    Timer::after(Duration::from_secs(5)).await;

    loop {
        for name in PLAYLIST {
            DISPLAY_REQUESTS.send(DisplayRequest::Image(name)).await;
            Timer::after(Duration::from_secs(4)).await;
        }
    }
}
