use super::register;
use crate::parse_scancode;
use evdev::Key;
use ir_keytable::rcdev::{Config, KeymapEntry, RcDevice};
use log::{debug, error};
use std::{
    fs,
    io::{self, Read},
    str::FromStr,
    thread,
};

pub fn replay(replay: &crate::Replay) {
    let (script, source) = match &replay.script {
        Some(path) => (fs::read_to_string(path), path.display().to_string()),
        None => {
            let mut s = String::new();

            (
                io::stdin().read_to_string(&mut s).map(|_| s),
                String::from("<stdin>"),
            )
        }
    };

    let script = match script {
        Ok(script) => script,
        Err(e) => {
            error!("{source}: {e}");
            std::process::exit(1);
        }
    };

    let mut config = Config {
        learn_scancodes: !replay.no_learn,
        ..Default::default()
    };

    if let Some(timeout) = replay.timeout {
        config.keypress_timeout = timeout;
    }

    let dev = register(&replay.device, config);

    for (line_no, line) in script.lines().enumerate() {
        if let Err(e) = replay_line(&dev, line) {
            error!("{source}:{}: {e}", line_no + 1);
            std::process::exit(1);
        }
    }

    dev.unregister();
}

fn replay_line(dev: &RcDevice, line: &str) -> Result<(), String> {
    if line.trim_start().starts_with('#') {
        return Ok(());
    }

    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        [] => (),
        ["repeat"] => dev.repeat(),
        ["keyup"] => dev.keyup(),
        ["sleep", duration] => {
            let duration = humantime::parse_duration(duration)
                .map_err(|e| format!("‘{duration}’ is not a valid duration: {e}"))?;

            thread::sleep(duration);
        }
        ["get", target] => {
            let mapping = dev
                .get_keycode(&keymap_entry(target, Key::KEY_RESERVED)?)
                .map_err(|e| e.to_string())?;

            let index = match mapping.index {
                Some(index) => index.to_string(),
                None => String::from("-"),
            };

            println!("{index}: {:#06x} {:?}", mapping.scancode, mapping.keycode);
        }
        ["set", target, keycode] => {
            let Ok(keycode) = Key::from_str(keycode) else {
                return Err(format!("‘{keycode}’ is not a valid keycode"));
            };

            let old = dev
                .set_keycode(&keymap_entry(target, keycode)?)
                .map_err(|e| e.to_string())?;

            debug!("{target}: {old:?} replaced by {keycode:?}");
        }
        [scancode] => dev.keydown(parse_scancode(scancode)?, 0),
        [scancode, toggle] => {
            let Ok(toggle) = toggle.parse::<u8>() else {
                return Err(format!("‘{toggle}’ is not a valid toggle"));
            };

            dev.keydown(parse_scancode(scancode)?, toggle);
        }
        _ => return Err(format!("‘{}’ not understood", line.trim())),
    }

    Ok(())
}

/// `#INDEX` addresses an entry by index, anything else is a scancode
fn keymap_entry(target: &str, keycode: Key) -> Result<KeymapEntry, String> {
    if let Some(index) = target.strip_prefix('#') {
        let Ok(index) = index.parse::<usize>() else {
            return Err(format!("‘{target}’ is not a valid index"));
        };

        Ok(KeymapEntry::by_index(index, keycode))
    } else {
        Ok(KeymapEntry::by_scancode(parse_scancode(target)?, keycode))
    }
}
