// /src/hardware.rs
use core::sync::atomic::{AtomicU16, Ordering};

use defmt::{info, warn};
use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::mode::Async;
use embassy_stm32::peripherals::{self, ADC1, PA0};
use embassy_stm32::rcc::{Hse, HseMode, Pll, PllMul, PllPreDiv, PllSource, Sysclk};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{Config as UartConfig, ConfigError, Uart, UartRx, UartTx};
use embassy_stm32::{adc, bind_interrupts, usart, Config, Peri};

use vts_controller::constants::{LCD_COLUMNS, STORE_SIZE};
use vts_controller::error::NvmError;
use vts_controller::peripherals::{
    Buzzer, CoSensor, Display, GasSampler, Nvm, UartRoute, UartSwitch,
};

bind_interrupts!(pub struct Irqs {
    ADC1_COMP => adc::InterruptHandler<peripherals::ADC1>;
    USART2 => usart::InterruptHandler<peripherals::USART2>;
});

pub type ModemTx = UartTx<'static, Async>;
pub type ModemRx = UartRx<'static, Async>;
pub type Adc1 = Adc<'static, ADC1>;

// STM32F051R8: 64 KiB flash in 1 KiB pages, contacts live in the last one
const STORE_PAGE_OFFSET: u32 = 63 * 1024;
const STORE_PAGE_SIZE: u32 = 1024;

// --- UART relay ---

/// PB3 drives the relay that hands USART2 to the GPS receiver when high.
pub struct UartRelay {
    select: Output<'static>,
}

impl UartSwitch for UartRelay {
    fn route(&mut self, route: UartRoute) {
        match route {
            UartRoute::Gsm => self.select.set_low(),
            UartRoute::Gps => self.select.set_high(),
        }
    }
}

// --- Buzzer ---

pub struct BuzzerPin {
    pin: Output<'static>,
}

impl Buzzer for BuzzerPin {
    fn on(&mut self) {
        self.pin.set_high();
    }

    fn off(&mut self) {
        self.pin.set_low();
    }
}

// --- Display ---

/// Mirrors screen writes to the RTT log.
pub struct LogDisplay;

impl Display for LogDisplay {
    fn clear(&mut self) {
        info!("LCD: clear");
    }

    fn write_at(&mut self, row: u8, col: u8, text: &str) {
        let end = text
            .char_indices()
            .nth(LCD_COLUMNS.saturating_sub(col as usize))
            .map_or(text.len(), |(i, _)| i);
        info!("LCD[{}:{}]: {}", row, col, &text[..end]);
    }
}

// --- MQ-9 gas sensor ---

/// Latest concentration estimate, refreshed by the sampling task.
pub static CO_PPM: AtomicU16 = AtomicU16::new(0);

/// The MQ-9 module's DO line is pulled low above the potentiometer threshold.
pub struct Mq9 {
    alarm: Input<'static>,
}

impl CoSensor for Mq9 {
    fn threshold_exceeded(&mut self) -> bool {
        self.alarm.is_low()
    }

    fn read_ppm(&mut self) -> u16 {
        CO_PPM.load(Ordering::Relaxed)
    }
}

pub struct Mq9Analog {
    pub pin: Peri<'static, PA0>,
    pub adc: Adc1,
}

impl GasSampler for Mq9Analog {
    async fn sample_resistance(&mut self) -> u32 {
        mq9_resistance(self.adc.read(&mut self.pin).await)
    }
}

const ADC_FULL_SCALE: u32 = 4095;

// Rs/R0 (percent) against ppm, from the datasheet CO curve, descending ratio
const MQ9_CO_CURVE: [(u32, u16); 8] = [
    (990, 0),
    (170, 200),
    (130, 400),
    (110, 600),
    (95, 800),
    (85, 1000),
    (65, 2000),
    (50, 4000),
];

/// Sensor resistance in load-resistor units (scaled by 100) for a raw sample.
pub fn mq9_resistance(raw: u16) -> u32 {
    let raw = (raw as u32).clamp(1, ADC_FULL_SCALE);
    (ADC_FULL_SCALE - raw) * 100 / raw
}

/// Maps a sample to ppm given the clean-air resistance from calibration.
pub fn mq9_ppm(raw: u16, clean_air_resistance: u32) -> u16 {
    if clean_air_resistance == 0 {
        return 0;
    }
    let ratio = mq9_resistance(raw) * 100 / clean_air_resistance;

    let (first_ratio, first_ppm) = MQ9_CO_CURVE[0];
    if ratio >= first_ratio {
        return first_ppm;
    }
    for pair in MQ9_CO_CURVE.windows(2) {
        let ((hi_ratio, lo_ppm), (lo_ratio, hi_ppm)) = (pair[0], pair[1]);
        if ratio >= lo_ratio {
            let span = (hi_ppm - lo_ppm) as u32;
            let offset = (hi_ratio - ratio) * span / (hi_ratio - lo_ratio);
            return lo_ppm + offset as u16;
        }
    }
    MQ9_CO_CURVE[MQ9_CO_CURVE.len() - 1].1
}

// --- Flash-backed storage ---

/// Contact storage in the last flash page, shadowed in RAM.
///
/// Every write rewrites the whole page, so a reset mid-write loses the page
/// state; the store's own checks recover from that on the next boot.
pub struct FlashNvm {
    flash: Flash<'static, Blocking>,
    shadow: [u8; STORE_SIZE],
}

impl FlashNvm {
    pub fn new(mut flash: Flash<'static, Blocking>) -> Result<Self, NvmError> {
        let mut shadow = [0xFF; STORE_SIZE];
        flash
            .blocking_read(STORE_PAGE_OFFSET, &mut shadow)
            .map_err(|_| NvmError::Hardware)?;
        Ok(Self { flash, shadow })
    }
}

impl Nvm for FlashNvm {
    fn read_byte(&mut self, address: u16) -> Result<u8, NvmError> {
        self.shadow
            .get(address as usize)
            .copied()
            .ok_or(NvmError::OutOfRange)
    }

    fn write_byte(&mut self, address: u16, byte: u8) -> Result<(), NvmError> {
        let slot = self
            .shadow
            .get_mut(address as usize)
            .ok_or(NvmError::OutOfRange)?;
        if *slot == byte {
            return Ok(());
        }
        *slot = byte;

        self.flash
            .blocking_erase(STORE_PAGE_OFFSET, STORE_PAGE_OFFSET + STORE_PAGE_SIZE)
            .map_err(|_| NvmError::Hardware)?;
        self.flash
            .blocking_write(STORE_PAGE_OFFSET, &self.shadow)
            .map_err(|e| {
                warn!("Flash write failed: {}", e);
                NvmError::Hardware
            })
    }
}

// --- Board ---

pub struct Board {
    pub modem_tx: ModemTx,
    pub modem_rx: ModemRx,
    pub relay: UartRelay,
    pub buzzer: BuzzerPin,
    pub co_sensor: Mq9,
    pub co_analog: Mq9Analog,
    pub flash: Flash<'static, Blocking>,
}

pub fn init() -> Result<Board, ConfigError> {
    // 1. Clock Configuration
    let mut config = Config::default();
    config.rcc.hse = Some(Hse {
        freq: Hertz::mhz(8),
        mode: HseMode::Bypass,
    });
    config.rcc.pll = Some(Pll {
        src: PllSource::HSE,
        prediv: PllPreDiv::DIV1,
        mul: PllMul::MUL6,
    });
    config.rcc.sys = Sysclk::PLL1_P;

    let p = embassy_stm32::init(config);
    info!("Hardware initialized! Clocked at 48MHz");

    // 2. Outputs, relay starts on the modem
    let relay = UartRelay {
        select: Output::new(p.PB3, Level::Low, Speed::Low),
    };
    let buzzer = BuzzerPin {
        pin: Output::new(p.PB4, Level::Low, Speed::Low),
    };
    let co_sensor = Mq9 {
        alarm: Input::new(p.PA1, Pull::Up),
    };

    // 3. USART2, shared by the SIM900 and the GPS receiver
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = 9600;
    let uart = Uart::new(
        p.USART2,
        p.PA3, p.PA2,
        Irqs,
        p.DMA1_CH4, p.DMA1_CH5,
        uart_config,
    )?;
    let (modem_tx, modem_rx) = uart.split();

    // 4. ADC
    let mut adc = Adc::new(p.ADC1, Irqs);
    adc.set_sample_time(SampleTime::CYCLES71_5);

    Ok(Board {
        modem_tx,
        modem_rx,
        relay,
        buzzer,
        co_sensor,
        co_analog: Mq9Analog { pin: p.PA0, adc },
        flash: Flash::new_blocking(p.FLASH),
    })
}
