use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {:?}", target)),
    }
}

pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {:?}", target)),
    }
}

fn describe(device: &Device, config: cpal::SupportedStreamConfig, default_name: &str) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut d = format!(
        " * {}({}ch, {}hz)",
        name,
        config.channels(),
        config.sample_rate().0
    );
    if name == default_name {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices()? {
        match in_device.default_input_config() {
            Ok(cfg) => device_names.push(describe(&in_device, cfg, &default_device)),
            Err(e) => tracing::debug!("Skipping input device without config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices()? {
        match out_device.default_output_config() {
            Ok(cfg) => device_names.push(describe(&out_device, cfg, &default_device)),
            Err(e) => tracing::debug!("Skipping output device without config: {}", e),
        }
    }
    Ok(device_names.join("\n"))
}
