// /src/main.rs
#![no_std]
#![no_main]

use core::sync::atomic::Ordering;

use defmt::{error, info, unwrap, warn};
use defmt_rtt as _;
use panic_probe as _;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};

mod hardware;

use vts_controller::app::Controller;
use vts_controller::co_alarm::calibrate_clean_air;
use vts_controller::contact_store::ContactStore;
use vts_controller::gps::GpsReceiver;
use vts_controller::inbox::Inbox;
use vts_controller::sim900::Sim900;

use crate::hardware::{mq9_ppm, FlashNvm, LogDisplay, ModemRx, Mq9Analog, CO_PPM};

const MAIN_LOOP_PERIOD_MS: u64 = 100;
const GSM_RETRY_PERIOD_SECS: u64 = 5;
const CO_SAMPLE_PERIOD_MS: u64 = 500;

// Everything USART2 receives, from the modem or the GPS depending on the relay
static INBOX: Inbox = Inbox::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut board = unwrap!(hardware::init());

    info!("Starting VTS controller...");

    unwrap!(spawner.spawn(modem_rx_task(board.modem_rx)));

    let mut display = LogDisplay;
    let clean_air = calibrate_clean_air(&mut board.co_analog, &mut display, &mut Delay).await;

    unwrap!(spawner.spawn(co_sampling_task(board.co_analog, clean_air)));

    let nvm = unwrap!(FlashNvm::new(board.flash));
    let store = unwrap!(ContactStore::open_or_reset(nvm));

    let mut controller = Controller::new(
        Sim900::new(board.modem_tx, &INBOX, Delay),
        GpsReceiver::new(board.relay, &INBOX, Delay),
        store,
        display,
        board.buzzer,
        board.co_sensor,
        Delay,
    );

    while let Err(e) = controller.start().await {
        error!("GSM module not responding: {}", e);
        Timer::after(Duration::from_secs(GSM_RETRY_PERIOD_SECS)).await;
    }

    loop {
        controller.run_once().await;
        Timer::after(Duration::from_millis(MAIN_LOOP_PERIOD_MS)).await;
    }
}

#[embassy_executor::task]
async fn modem_rx_task(rx: ModemRx) {
    let mut dma_buf = [0u8; 256];
    let mut ring = rx.into_ring_buffered(&mut dma_buf);

    let mut chunk = [0u8; 32];
    loop {
        match ring.read(&mut chunk).await {
            Ok(n) => INBOX.push_bytes(&chunk[..n]),
            Err(e) => warn!("USART2 RX error: {}", e),
        }
    }
}

#[embassy_executor::task]
async fn co_sampling_task(mut analog: Mq9Analog, clean_air: u32) {
    loop {
        let raw = analog.adc.read(&mut analog.pin).await;
        CO_PPM.store(mq9_ppm(raw, clean_air), Ordering::Relaxed);
        Timer::after(Duration::from_millis(CO_SAMPLE_PERIOD_MS)).await;
    }
}
