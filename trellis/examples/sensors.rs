use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use trellis::{Config, Emission, Emitter, Meta, Result};

#[derive(Debug, Clone)]
enum Reading {
    Temperature(f64),
    Humidity(f64),
    Online(bool),
}

fn main() -> Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let emitter = Emitter::<Reading>::builder()
        .config(Config::default().with_meta(Meta::new().with("site", "greenhouse")))
        .on_listener_error(|topic, err| eprintln!("[{topic}] {err}"))
        .build();

    // Devices announce themselves with retained messages, so dashboards
    // started later still see the current state.
    let devices = emitter.scope("device")?;
    devices.emit_retained("north.online", Reading::Online(true))?;
    devices.emit_retained("south.online", Reading::Online(false))?;

    let averages = Rc::new(RefCell::new(BTreeMap::<String, (f64, u32)>::new()));
    let avg = averages.clone();
    devices.on("*.temperature", move |msg| {
        if let Reading::Temperature(t) = msg.payload() {
            let device = msg.topic().split('.').next().unwrap_or_default().to_string();
            let mut avg = avg.borrow_mut();
            let slot = avg.entry(device).or_insert((0.0, 0));
            slot.0 += t;
            slot.1 += 1;
        }
        Ok(())
    })?;

    devices.on("north.online", |msg| {
        println!(
            "dashboard: north is {:?} (replayed from {})",
            msg.payload(),
            msg.topic()
        );
        Ok(())
    })?;

    devices.on("*.humidity", |msg| match msg.payload() {
        Reading::Humidity(h) if *h > 100.0 => Err(format!("impossible humidity {h}").into()),
        _ => Ok(()),
    })?;

    emitter.on_any(|msg| {
        println!(
            "audit: {} {:?} {:?}",
            msg.topic(),
            msg.payload(),
            msg.meta().get("site")
        );
        Ok(())
    });

    let north = devices.scope("north")?.with_meta(Meta::new().with("rack", 3));
    for t in [21.0, 22.5, 23.0] {
        north.emit("temperature", Reading::Temperature(t))?;
    }
    devices.emit("south.temperature", Reading::Temperature(18.0))?;

    let results = devices.emit_with(
        Emission::new("south.humidity", Reading::Humidity(140.0)).meta("calibrated", false),
    )?;
    println!(
        "humidity listeners: {} ok, {} failed",
        results.iter().filter(|r| r.is_ok()).count(),
        results.iter().filter(|r| r.is_err()).count(),
    );

    for (device, (sum, n)) in averages.borrow().iter() {
        println!("{device}: average {:.1} over {n} readings", sum / f64::from(*n));
    }

    println!(
        "{} listeners, {} retained",
        emitter.listener_count(),
        emitter.retained_messages().len()
    );
    devices.clear();
    println!("after clearing devices: {} listeners", emitter.listener_count());
    Ok(())
}
