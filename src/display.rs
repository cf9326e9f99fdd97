//! ILI9341 display driver: 240×320 TFT in portrait over SPI with DMA.

use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    Async,
    dma::{
        DmaRxBuf,
        DmaTxBuf,
    },
    dma_buffers,
    gpio::{
        Level,
        Output,
        OutputConfig,
    },
    spi::master::Spi,
    time::Rate,
};

use crate::{
    DisplayResources,
    config::{
        PANEL_HEIGHT,
        PANEL_WIDTH,
    },
};

type SpiInterface<'a> = mipidsi::interface::SpiInterface<
    'a,
    ExclusiveDevice<esp_hal::spi::master::SpiDmaBus<'a, Async>, Output<'a>, esp_hal::delay::Delay>,
    Output<'a>,
>;

/// The ILI9341 panel, ready to draw on with `embedded-graphics` or to hand
/// to a [`Renderer`](crate::Renderer).
pub type Display<'a> = mipidsi::Display<SpiInterface<'a>, mipidsi::models::ILI9341Rgb565, Output<'a>>;

const BUFFER_LEN: usize = 32000;

impl<'a> From<DisplayResources<'a>> for Display<'a> {
    fn from(res: DisplayResources<'a>) -> Self {
        let (rx_buffer, rx_descriptors, tx_buffer, tx_descriptors) = dma_buffers!(BUFFER_LEN);
        let dma_rx_buf = DmaRxBuf::new(rx_descriptors, rx_buffer).unwrap();
        let dma_tx_buf = DmaTxBuf::new(tx_descriptors, tx_buffer).unwrap();

        let mut delay = esp_hal::delay::Delay::new();

        let dc = Output::new(res.dc, Level::Low, OutputConfig::default());
        let mut rst = Output::new(res.rst, Level::Low, OutputConfig::default());
        rst.set_high();

        let spi = Spi::new(
            res.spi,
            esp_hal::spi::master::Config::default().with_frequency(Rate::from_mhz(40)),
        )
        .unwrap()
        .with_sck(res.sck)
        .with_mosi(res.mosi)
        .with_miso(res.miso)
        .with_dma(res.dma)
        .with_buffers(dma_rx_buf, dma_tx_buf)
        .into_async();

        let cs = Output::new(res.cs, Level::High, OutputConfig::default());
        let spi_device = ExclusiveDevice::new(spi, cs, delay).unwrap();

        let buffer = crate::mk_static!([u8; BUFFER_LEN], [0_u8; BUFFER_LEN]);
        let di = mipidsi::interface::SpiInterface::new(spi_device, dc, buffer);

        // Portrait, no rotation. The module is wired BGR.
        mipidsi::Builder::new(mipidsi::models::ILI9341Rgb565, di)
            .reset_pin(rst)
            .display_size(PANEL_WIDTH as u16, PANEL_HEIGHT as u16)
            .color_order(mipidsi::options::ColorOrder::Bgr)
            .orientation(mipidsi::options::Orientation::new())
            .init(&mut delay)
            .unwrap()
    }
}
