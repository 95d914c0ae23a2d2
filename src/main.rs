#![deny(unsafe_code)]
#![no_main]
#![no_std]

use embassy_executor::{task, Spawner};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::Timer;
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use esp_hal::{
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    gpio::{GpioPin, Input, Pull, RtcPinWithResistors},
    peripherals::{ADC1, UART0, UART1},
    rtc_cntl::{
        sleep::{RtcioWakeupSource, WakeupLevel},
        Rtc,
    },
    timer::timg::TimerGroup,
    uart::{Config, UartRx, UartTx},
    Async,
};

use defmt::{info, warn};
use esp_backtrace as _;
use esp_storage::FlashStorage;

use homeward::{
    button::ButtonDebouncer,
    config::{NavConfig, BUTTON_POLL_INTERVAL},
    gps::NmeaFixSource,
    navigation::{Frame, NavigationCore, RenderSink, Status},
    pins,
    power::{PowerControl, PowerState, WakeSource},
    storage::FlashStore,
    target::TargetKind,
    time::{at_millis, Instant},
};

/// Start of the data partition in the default partition table.
const STORE_BASE: u32 = 0x9000;
const LINE_CAPACITY: usize = 256;

type Nav = NavigationCore<FlashStore<FlashStorage>>;
type SharedNav = Mutex<CriticalSectionRawMutex, Nav>;
type SharedGps = Mutex<CriticalSectionRawMutex, NmeaFixSource>;

static NAV: StaticCell<SharedNav> = StaticCell::new();
static GPS: StaticCell<SharedGps> = StaticCell::new();

fn now() -> Instant {
    at_millis(embassy_time::Instant::now().as_millis())
}

/// Logs the frame whenever what the user would see changes.
#[derive(Default)]
struct DefmtSink {
    last: Option<(Status, TargetKind, bool)>,
}

impl RenderSink for DefmtSink {
    fn render(&mut self, frame: &Frame) {
        let summary = (frame.status, frame.targets.chosen, frame.banner.is_some());
        if self.last != Some(summary) {
            self.last = Some(summary);
            info!("{:?}", frame);
        }
    }
}

struct DeepSleep<'a> {
    rtc: &'a mut Rtc<'static>,
    key: &'a mut GpioPin<3>,
}

impl PowerControl for DeepSleep<'_> {
    fn suspend_until_wake(&mut self, wake: WakeSource) -> ! {
        info!("deep sleep, wake on {:?}", wake);
        let mut wake_pins: [(&mut dyn RtcPinWithResistors, WakeupLevel); 1] =
            [(&mut *self.key, WakeupLevel::Low)];
        let rtcio = RtcioWakeupSource::new(&mut wake_pins);
        self.rtc.sleep_deep(&[&rtcio])
    }
}

#[task]
async fn gps_reader(mut rx: UartRx<'static, UART0, Async>, gps: &'static SharedGps) -> ! {
    let mut buffer = [0u8; 64];

    loop {
        match Read::read(&mut rx, &mut buffer).await {
            Ok(count) => {
                gps.lock().await.feed(&buffer[..count], now());
            }
            Err(e) => {
                // The parser resynchronises on the next '$'
                warn!("GPS UART error: {:?}", e);
            }
        }
    }
}

#[task]
async fn navigation_loop(nav: &'static SharedNav, gps: &'static SharedGps) -> ! {
    let mut sink = DefmtSink::default();

    loop {
        Timer::after_millis(100).await;
        let now = now();

        let mut nav = nav.lock().await;
        nav.poll(&mut *gps.lock().await, now);
        nav.tick(now);
        nav.render(&mut sink, now);
    }
}

/// Owns the key. Polls it until the core goes to sleep, then hands the same
/// pin to the RTC as the wake source.
#[task]
async fn key_and_power(mut key: GpioPin<3>, mut rtc: Rtc<'static>, nav: &'static SharedNav) -> ! {
    {
        let config = *nav.lock().await.config();
        let mut button = ButtonDebouncer::new(Input::new(&mut key, Pull::Up), &config);

        loop {
            Timer::after_millis(BUTTON_POLL_INTERVAL.ticks()).await;
            let now = now();

            let mut nav = nav.lock().await;
            if let Some(event) = button.poll(now) {
                info!("key: {:?}", event);
                nav.on_button(event, now);
            }
            if nav.power_state() == PowerState::Sleeping {
                break;
            }
        }
    }

    // Let the key be released so it does not wake us immediately
    while Input::new(&mut key, Pull::Up).is_low() {
        Timer::after_millis(BUTTON_POLL_INTERVAL.ticks()).await;
    }

    let mut nav = nav.lock().await;
    nav.suspend(&mut DeepSleep {
        rtc: &mut rtc,
        key: &mut key,
    })
}

#[task]
async fn command_link(
    mut rx: UartRx<'static, UART1, Async>,
    mut tx: UartTx<'static, UART1, Async>,
    nav: &'static SharedNav,
) -> ! {
    let mut line: heapless::Vec<u8, LINE_CAPACITY> = heapless::Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if let Err(e) = Read::read_exact(&mut rx, &mut byte).await {
            warn!("link UART error: {:?}", e);
            line.clear();
            continue;
        }
        if byte[0] != b'\n' {
            if line.push(byte[0]).is_err() {
                warn!("command too long, dropped");
                line.clear();
            }
            continue;
        }

        let response = match core::str::from_utf8(&line) {
            Ok(text) => nav.lock().await.apply_remote_command(text),
            Err(_) => {
                let mut response = homeward::command::Response::new();
                let _ = homeward::command::write_error(
                    &mut response,
                    homeward::command::CommandError::Malformed,
                );
                response
            }
        };
        line.clear();

        if Write::write_all(&mut tx, response.as_bytes()).await.is_err()
            || Write::write_all(&mut tx, b"\n").await.is_err()
        {
            warn!("link UART write failed");
        }
    }
}

#[task]
async fn battery_monitor(
    mut adc: Adc<'static, ADC1>,
    mut pin: AdcPin<GpioPin<2>, ADC1>,
    nav: &'static SharedNav,
) -> ! {
    loop {
        match nb::block!(adc.read_oneshot(&mut pin)) {
            Ok(raw) => nav.lock().await.set_battery_adc(raw),
            Err(_) => warn!("battery read failed"),
        }
        Timer::after_millis(30_000).await;
    }
}

#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) -> () {
    info!("Initializing");

    let peripherals = esp_hal::init(esp_hal::Config::default());

    let pins = pins::get_nav_pins_v001(peripherals);

    let timg0 = TimerGroup::new(pins.timg);

    esp_hal_embassy::init(timg0.timer0);

    let rtc = Rtc::new(pins.lpwr);

    info!("Initializing compete");

    let store = FlashStore::new(FlashStorage::new(), STORE_BASE);
    let nav = &*NAV.init(Mutex::new(NavigationCore::new(store, NavConfig::default(), now())));
    let gps = &*GPS.init(Mutex::new(NmeaFixSource::new()));

    // Setup UART for GPS
    let gps_config = Config::default().baudrate(9600);
    let gps_uart = esp_hal::uart::Uart::new_with_config(pins.gps_uart, gps_config, pins.gps_rx, pins.gps_tx)
        .unwrap()
        .into_async();

    let (gps_rx, _) = gps_uart.split();

    // Note that this task now owns the GPS RX line completely
    _spawner.spawn(gps_reader(gps_rx, gps)).unwrap();

    // Setup UART for the configuration link
    let link_config = Config::default().baudrate(9600);
    let link_uart =
        esp_hal::uart::Uart::new_with_config(pins.link_uart, link_config, pins.link_rx, pins.link_tx)
            .unwrap()
            .into_async();

    let (link_rx, link_tx) = link_uart.split();
    _spawner.spawn(command_link(link_rx, link_tx, nav)).unwrap();

    // Setup ADC for the battery divider
    let mut adc_config = AdcConfig::new();
    let battery_pin = adc_config.enable_pin(pins.battery, Attenuation::Attenuation11dB);
    let adc = Adc::new(pins.adc, adc_config);
    _spawner.spawn(battery_monitor(adc, battery_pin, nav)).ok();

    _spawner.spawn(key_and_power(pins.key, rtc, nav)).unwrap();
    _spawner.spawn(navigation_loop(nav, gps)).unwrap();
}
