//! Software-in-the-loop bench: flies the real flight core against a
//! simulated vehicle and writes the flight log to disk.

mod agent;

use agent::{FlightProfile, SimBarometer, SimImu, SimPyro, SimServo, World};
use altimeter_core::log::MAX_LOG_LINE_LEN;
use altimeter_core::{
    ChannelLogger, Clock, DeviceRole, EmbassyClock, FLIGHT_RECORD_MAX_SIZE, FlightComputer,
    FlightConfig, FlightPhase, LogBuffer, LogChannel, LogEntry, RecoveryDevice, TickFlag,
    sample_ticker,
};
use anyhow::{Context, Result};
use clap::Parser;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

static TICK: TickFlag = TickFlag::new();
static LOG_CHANNEL: LogChannel<512> = LogChannel::<512>::new();

/// Simulated flight through the altimeter flight core
#[derive(Parser, Debug)]
#[command(name = "altimeter-sitl")]
#[command(version)]
struct Args {
    /// JSON flight configuration; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the main chute deployment altitude (m)
    #[arg(long)]
    deployment_altitude: Option<f64>,

    /// Override the sample period (ms)
    #[arg(long)]
    sample_period: Option<u64>,

    /// Motor proper acceleration (m/s²)
    #[arg(long, default_value_t = 60.0)]
    boost: f64,

    /// Motor burn time (s)
    #[arg(long, default_value_t = 2.0)]
    burn_time: f64,

    /// Barometer noise, 1 sigma (Pa)
    #[arg(long, default_value_t = 1.5)]
    pressure_noise: f64,

    /// Accelerometer noise per axis, 1 sigma (m/s²)
    #[arg(long, default_value_t = 0.3)]
    accel_noise: f64,

    /// Use servo releases instead of pyro charges
    #[arg(long)]
    servo: bool,

    /// Simulate a barometer that fails to start
    #[arg(long)]
    no_baro: bool,

    /// Simulate an IMU that fails to start
    #[arg(long)]
    no_imu: bool,

    /// Fly the built-in synthetic profile instead of the simulated vehicle
    #[arg(long)]
    test_flight: bool,

    /// Pace the loop with the wall clock instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Give up after this much simulated time (s)
    #[arg(long, default_value_t = 300.0)]
    max_time: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output directory for the flight CSV and record
    #[arg(long, default_value = "flight-log")]
    out: PathBuf,
}

fn load_config(args: &Args) -> Result<FlightConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => FlightConfig::default(),
    };
    if let Some(altitude) = args.deployment_altitude {
        config.deployment_altitude_m = altitude;
    }
    if let Some(period) = args.sample_period {
        config.sample_period_ms = period;
    }
    config.validate().context("invalid flight configuration")?;
    Ok(config)
}

/// Drains the log channel into the CSV trace and writes finished records.
struct LogSink {
    out_dir: PathBuf,
    csv: BufWriter<File>,
    rows: u64,
}

impl LogSink {
    fn create(out_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;
        let path = out_dir.join("flight.csv");
        let mut csv = BufWriter::new(
            File::create(&path).with_context(|| format!("creating {}", path.display()))?,
        );

        let mut header = LogBuffer::<1024>::new();
        LogEntry::write_schema(&mut header)
            .map_err(|_| anyhow::anyhow!("schema does not fit the header buffer"))?;
        csv.write_all(header.get_active_buffer())?;

        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            csv,
            rows: 0,
        })
    }

    fn drain(&mut self, channel: &LogChannel<512>) -> Result<()> {
        while let Ok(entry) = channel.try_receive() {
            let mut line = LogBuffer::<MAX_LOG_LINE_LEN>::new();
            if line.write_entry(&entry).is_err() {
                warn!("Log row too long, dropped");
                continue;
            }
            self.csv.write_all(line.get_active_buffer())?;
            self.rows += 1;

            if let LogEntry::Record {
                record,
                flight_index,
            } = entry
            {
                let mut buf = [0u8; FLIGHT_RECORD_MAX_SIZE];
                let bytes = record
                    .encode(&mut buf)
                    .map_err(|e| anyhow::anyhow!("encoding flight record: {e}"))?;
                let path = self.out_dir.join(format!("flight_{flight_index:03}.bin"));
                std::fs::write(&path, bytes)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Flight {} saved to {}", flight_index, path.display());
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.csv.flush()?;
        Ok(self.rows)
    }
}

type Computer = FlightComputer<'static, SimBarometer, SimImu, SimPyro, SimServo>;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let profile = FlightProfile {
        boost_acceleration: args.boost,
        burn_time_s: args.burn_time,
        ..FlightProfile::default()
    };
    let world = World::shared();

    let device = |role: DeviceRole, id: u8| {
        if args.servo {
            let angles = match role {
                DeviceRole::Drogue => config.drogue_servo,
                DeviceRole::Main => config.main_servo,
            };
            RecoveryDevice::servo(id, SimServo::new(world.clone(), role, angles), angles)
        } else {
            RecoveryDevice::pyro(id, SimPyro::new(world.clone(), role))
        }
    };

    let mut fc: Computer = FlightComputer::new(
        SimBarometer::new(
            world.clone(),
            profile.pad_elevation_m,
            args.pressure_noise,
            args.seed,
            !args.no_baro,
        )?,
        SimImu::new(world.clone(), args.accel_noise, args.seed + 1, !args.no_imu)?,
        device(DeviceRole::Drogue, 1),
        device(DeviceRole::Main, 2),
        &TICK,
        config,
    )
    .context("building flight computer")?;

    let mut logger = ChannelLogger::new(&LOG_CHANNEL, 1);
    let mut sink = LogSink::create(&args.out)?;

    let readiness = fc.init();
    info!(
        "Sensors: barometer {}, imu {}",
        readiness.barometer, readiness.imu
    );
    fc.arm(0, &mut logger);
    if args.test_flight {
        fc.run_test();
    }

    let period_s = config.sample_period_ms as f64 / 1_000.0;
    if args.realtime {
        let run = run_realtime(&mut fc, &mut logger, &mut sink, &world, &profile, &args);
        let ticker = sample_ticker(&TICK, Duration::from_millis(config.sample_period_ms));
        match embassy_futures::block_on(select(ticker, run)) {
            Either::First(never) => match never {},
            Either::Second(result) => result?,
        }
    } else {
        let mut now_us = 0u64;
        while world.borrow().time_s < args.max_time && TICK.is_active() {
            world.borrow_mut().advance(period_s, &profile);
            now_us += config.sample_period_ms * 1_000;
            TICK.raise();
            step(&mut fc, now_us, &mut logger, &mut sink)?;
        }
    }

    sink.drain(&LOG_CHANNEL)?;
    let rows = sink.finish()?;
    report(&fc, &world.borrow(), rows, logger.dropped());
    Ok(())
}

fn step(
    fc: &mut Computer,
    now_us: u64,
    logger: &mut ChannelLogger<'static, 512>,
    sink: &mut LogSink,
) -> Result<()> {
    if let Some(events) = fc.service(now_us, logger) {
        for event in events {
            info!("[{:>8.2}s] {:?}", now_us as f64 / 1e6, event);
        }
    }
    sink.drain(&LOG_CHANNEL)
}

async fn run_realtime(
    fc: &mut Computer,
    logger: &mut ChannelLogger<'static, 512>,
    sink: &mut LogSink,
    world: &agent::SharedWorld,
    profile: &FlightProfile,
    args: &Args,
) -> Result<()> {
    let clock = EmbassyClock;
    let start_us = clock.now_micros();
    let mut last_us = start_us;
    loop {
        Timer::after_millis(1).await;
        let now_us = clock.now_micros();
        world
            .borrow_mut()
            .advance((now_us - last_us) as f64 / 1e6, profile);
        last_us = now_us;

        step(fc, now_us - start_us, logger, sink)?;
        if !TICK.is_active() || world.borrow().time_s >= args.max_time {
            return Ok(());
        }
    }
}

fn report(fc: &Computer, world: &World, rows: u64, dropped: u32) {
    let status = fc.status();
    let record = fc.controller().record();
    println!("---------------------------------------------");
    println!("Phase:            {}", status.phase.label());
    println!("Flight index:     {}", status.flight_index);
    println!("True apogee:      {:.1} m", world.apogee);
    println!("Measured apogee:  {:.1} m", record.apogee);
    println!("Drogue at:        {:.1} m", record.drogue_ejection_altitude);
    println!("Main at:          {:.1} m", record.main_ejection_altitude);
    println!("Max acceleration: {:.1} m/s²", record.max_acceleration);
    if let Some(t) = record.burnout_time_ms {
        println!("Burnout:          {:.1} m at {} ms", record.burnout_altitude, t);
    }
    println!("Landed:           {}", world.landed);
    println!("Log rows:         {rows} ({dropped} dropped)");
    println!("Tick overruns:    {}", TICK.overruns());
    if status.phase != FlightPhase::OnGround {
        warn!("Flight did not complete within the time limit");
    }
}
