use super::register;
use ir_keytable::rcdev::Config;
use itertools::Itertools;

pub fn show(show: &crate::Show) {
    let dev = register(&show.device, Config::default());

    let (name, protocol, len, size) = dev.table_info();

    println!("name: {name}");
    println!("protocol: {protocol}");
    println!(
        "timeout: {}",
        humantime::format_duration(dev.config().keypress_timeout)
    );
    println!("capacity: {size}");
    println!("len: {len}");

    for (index, entry) in dev.entries().iter().enumerate() {
        println!("{index}: {:#06x} {:?}", entry.scancode, entry.keycode);
    }

    println!(
        "keys: {}",
        dev.supported_keys()
            .iter()
            .map(|key| format!("{key:?}"))
            .join(" ")
    );

    dev.unregister();
}
