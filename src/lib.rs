//! # tft-imageframe
//!
//! Shows PNG and JPEG files from on-board storage on a 240×320 ILI9341 TFT.
//!
//! The image path is hardware independent and runs on the host in tests:
//! - **Store**: named files under `/images/` ([`source`]), kept in a flash
//!   partition across reboots ([`flash`])
//! - **Decoders**: streaming PNG rows and tiled JPEG ([`decoder`])
//! - **Pixel conversion**: 24/32 bpp to RGB565 ([`pixel`])
//! - **Renderer**: one call from filename to pixels, with on-screen error
//!   panels ([`renderer`])
//! - **Screens**: boot splash, connection info and a debug console
//!
//! With the `board` feature the crate also brings up the ESP32-S3 panel and
//! backlight.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let peripherals = tft_imageframe::init();
//! let resources = tft_imageframe::split_resources!(peripherals);
//!
//! let mut display: tft_imageframe::Display = resources.display.into();
//! let store = tft_imageframe::image_store(peripherals.FLASH).unwrap();
//! let mut renderer = tft_imageframe::Renderer::new(store);
//! renderer.display(&mut display, "photo.jpg");
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod config;
pub mod console;
pub mod decoder;
pub mod diagnostic;
pub mod flash;
pub mod pixel;
pub mod renderer;
pub mod source;
pub mod splash;
pub mod surface;

#[cfg(test)]
mod testing;

#[cfg(feature = "board")]
mod backlight;
#[cfg(feature = "board")]
mod display;

#[cfg(feature = "board")]
pub use backlight::Backlight;
pub use console::{
    Console,
    Level,
};
pub use decoder::{
    ImageDecoder,
    ImageFormat,
    JpegDecoder,
    PngDecoder,
};
#[cfg(feature = "board")]
pub use display::Display;
pub use flash::FlashStore;
pub use renderer::{
    Outcome,
    Renderer,
};
pub use source::{
    ImageSource,
    ImageStore,
    MemoryStore,
};

/// StaticCell helper: allocates a value into a `static` exactly once.
#[cfg(feature = "board")]
#[macro_export]
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

#[cfg(feature = "board")]
pub use board::*;

#[cfg(feature = "board")]
mod board {
    use esp_hal::{
        assign_resources,
        clock::{
            Clock,
            CpuClock,
        },
        peripherals::FLASH,
        rom,
    };
    use esp_storage::FlashStorage;

    use crate::{
        config::{
            IMAGE_PARTITION,
            IMAGE_SLOT_SIZE,
        },
        flash::FlashStore,
        source::StorageError,
    };

    // ── Pin / peripheral assignments ────────────────────────────────────────

    assign_resources! {
        pub Resources<'d> {
            display: DisplayResources<'d> {
                cs: GPIO5,
                rst: GPIO6,
                dc: GPIO7,
                mosi: GPIO8,
                sck: GPIO9,
                miso: GPIO20,
                spi: SPI2,
                dma: DMA_CH0,
            },
            backlight: BacklightResources<'d> {
                led: GPIO10,
            },
        }
    }

    // ── Board initialisation ────────────────────────────────────────────────

    /// Minimal CPU clock switcher for ESP32-S3.
    ///
    /// Steps through an intermediate frequency before reaching the target,
    /// which is required by the hardware.
    fn set_cpu_clock(cpu_clock_speed: CpuClock) {
        let _ = esp_hal::peripherals::SYSTEM::regs()
            .sysclk_conf()
            .modify(|_, w| unsafe { w.soc_clk_sel().bits(1) });
        let _ = esp_hal::peripherals::SYSTEM::regs()
            .cpu_per_conf()
            .modify(|_, w| unsafe {
                let _ = w.pll_freq_sel().set_bit();
                w.cpuperiod_sel().bits(match cpu_clock_speed {
                    CpuClock::_80MHz => 0,
                    CpuClock::_160MHz => 1,
                    CpuClock::_240MHz => 2,
                    _ => panic!("Unsupported CPU clock speed"),
                })
            });

        rom::ets_update_cpu_frequency_rom(cpu_clock_speed.frequency().as_mhz());
    }

    /// Initialise the board and return the raw peripheral set.
    ///
    /// Call this once at the top of `main`, then use [`split_resources!`] to
    /// break the peripherals into the display and backlight groups.
    #[must_use]
    pub fn init() -> esp_hal::peripherals::Peripherals {
        set_cpu_clock(CpuClock::_160MHz);
        let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
        esp_hal::init(config)
    }

    /// Mounts the image partition of the on-board flash.
    pub fn image_store(flash: FLASH<'static>) -> Result<FlashStore<FlashStorage<'static>>, StorageError> {
        FlashStore::mount(FlashStorage::new(flash), IMAGE_PARTITION, IMAGE_SLOT_SIZE)
    }

    impl From<esp_hal::peripherals::Peripherals> for Resources<'_> {
        fn from(peripherals: esp_hal::peripherals::Peripherals) -> Self {
            split_resources!(peripherals)
        }
    }
}
