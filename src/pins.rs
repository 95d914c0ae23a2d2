use esp_hal::{
    gpio::{AnyPin, GpioPin, Pin},
    peripherals::{Peripherals, ADC1, LPWR, TIMG0, UART0, UART1},
};

pub struct NavPins {
    pub gps_rx: AnyPin,
    pub gps_tx: AnyPin,

    pub link_rx: AnyPin,
    pub link_tx: AnyPin,

    // Concrete types: the key must stay an RTC pin to wake from deep sleep,
    // and the battery sense pin has to be an ADC1 channel
    pub key: GpioPin<3>,
    pub battery: GpioPin<2>,

    pub timg: TIMG0,
    pub gps_uart: UART0,
    pub link_uart: UART1,
    pub adc: ADC1,
    pub lpwr: LPWR,
}

pub fn get_nav_pins_v001(p: Peripherals) -> NavPins {
    NavPins {
        gps_rx: p.GPIO20.degrade(),
        gps_tx: p.GPIO21.degrade(),

        link_rx: p.GPIO6.degrade(),
        link_tx: p.GPIO7.degrade(),

        key: p.GPIO3,
        battery: p.GPIO2,

        timg: p.TIMG0,
        gps_uart: p.UART0,
        link_uart: p.UART1,
        adc: p.ADC1,
        lpwr: p.LPWR,
    }
}
