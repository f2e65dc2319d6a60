//! Parse linux rc keymaps

use super::Keymap;
use std::{collections::HashMap, ffi::OsStr, fs::File, io::Read, path::Path};
use toml::{Table, Value};

peg::parser! {
    grammar text_keymap() for str {
        pub rule keymap() -> Vec<Keymap>
        = (_ newline())* first:first_line() lines:lines() _
        {
            let scancodes: HashMap<u64, String> = lines
                .into_iter()
                .flatten()
                .map(|(code, name)| (code, name.to_owned()))
                .collect();

            let mut protocol = vec![Keymap {
                    name: first.0.to_owned(),
                    protocol: first.1[0].to_owned(),
                    scancodes,
                    ..Default::default()
            }];

            for other in &first.1[1..] {
                protocol.push(Keymap { protocol: other.to_string(), ..Default::default() });
            }

            protocol
        }

        rule first_line() -> (&'input str, Vec<&'input str>)
        = _ "#" _ "table" (":" / "=")? _ name:identifier()  _ "," _ "type" (":" / "=")? _ protocols:protocols() _ newline()
        { (name, protocols) }

        rule identifier() -> &'input str
        = quiet!{$([ 'a'..='z' | 'A'..='Z']['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' ]*)}
        / expected!("identifier")

        rule protocols() -> Vec<&'input str>
        = protocols:(identifier() ++ ("," _)) { protocols }

        rule lines() -> Vec<Option<(u64, &'input str)>>
        = codes:((scancode() / comment()) ** newline()) { codes }

        rule newline()
        = "\r\n" / "\n"

        rule comment() -> Option<(u64, &'input str)>
        = _ "#" [^'\n']* { None }
        / _ { None }

        rule scancode() -> Option<(u64, &'input str)>
        = _ hex:hex() _ id:identifier() _ { Some((hex, id)) }

        rule hex() -> u64
        = "0x" hex:$(['0'..='9' | 'a'..='f' | 'A'..='F']+) _
        {? u64::from_str_radix(hex, 16).or(Err("64 bit scancode")) }

        rule _ = quiet!{[' ' | '\t']*}
    }
}

fn string_to_scancode(s: &str) -> Result<u64, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        str::parse(s)
    }
}

impl Keymap {
    pub fn parse(path: &Path) -> Result<Vec<Keymap>, String> {
        let mut f = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;

        let mut contents = String::new();

        f.read_to_string(&mut contents)
            .map_err(|e| format!("{}: {e}", path.display()))?;

        Keymap::parse_text(&contents, path)
    }

    /// Parse a rc keymap file, either toml or old text format. Keycode names are
    /// not validated here
    pub fn parse_text(contents: &str, filename: &Path) -> Result<Vec<Keymap>, String> {
        if filename.extension() == Some(OsStr::new("toml")) {
            parse_toml(contents, filename)
        } else {
            text_keymap::keymap(contents)
                .map_err(|pos| format!("{}: parse error at {pos}", filename.display()))
        }
    }
}

fn parse_toml(contents: &str, filename: &Path) -> Result<Vec<Keymap>, String> {
    let top = contents
        .parse::<Table>()
        .map_err(|e| format!("{}: {e}", filename.display()))?;

    let Some(Value::Array(protocols)) = top.get("protocols") else {
        return Err(format!(
            "{}: missing top level protocols array",
            filename.display()
        ));
    };

    let mut res = Vec::new();

    for entry in protocols {
        let Some(Value::String(name)) = entry.get("name") else {
            return Err(format!("{}: missing name", filename.display()));
        };

        let Some(Value::String(protocol)) = entry.get("protocol") else {
            return Err(format!("{}: missing protocol", filename.display()));
        };

        if protocol == "raw" {
            return Err(format!(
                "{}: raw keymaps have no scancodes",
                filename.display()
            ));
        }

        let mut variant = None;
        if let Some(Value::String(entry)) = entry.get("variant") {
            variant = Some(entry.to_owned());
        }

        let mut rc_protocol = None;
        if let Some(Value::Integer(n)) = entry.get("rc_protocol") {
            if let Ok(n) = (*n).try_into() {
                rc_protocol = Some(n);
            } else {
                return Err(format!(
                    "{}: rc_protocol {n} must be 16 bit value",
                    filename.display()
                ));
            }
        }

        let mut scancodes = HashMap::new();

        if let Some(Value::Table(codes)) = entry.get("scancodes") {
            for (scancode, keycode) in codes {
                let scancode = string_to_scancode(scancode).map_err(|_| {
                    format!("{}: {scancode} is a not valid scancode", filename.display())
                })?;
                let Value::String(keycode) = keycode else {
                    return Err(format!("{}: keycode should be string", filename.display()));
                };

                scancodes.insert(scancode, keycode.to_owned());
            }
        }

        res.push(Keymap {
            name: name.to_owned(),
            protocol: protocol.to_owned(),
            variant,
            rc_protocol,
            scancodes,
        });
    }

    Ok(res)
}

#[test]
fn parse_toml_test() {
    let s = r#"
    [[protocols]]
    name = "hauppauge"
    protocol = "rc5"
    variant = "rc5"
    [protocols.scancodes]
    0x1e3b = "KEY_SELECT"
    0x1e3d = "KEY_POWER2"
    0x1e1c = "KEY_TV"
    "#;

    let k = Keymap::parse_text(s, Path::new("x.toml")).unwrap();

    assert_eq!(k[0].name, "hauppauge");
    assert_eq!(k[0].protocol, "rc5");
    assert_eq!(k[0].variant, Some(String::from("rc5")));
    for s in &k[0].scancodes {
        match (s.0, s.1.as_str()) {
            (0x1e3b, "KEY_SELECT") | (0x1e3d, "KEY_POWER2") | (0x1e1c, "KEY_TV") => {}
            _ => panic!("{s:?} not expected"),
        }
    }

    let s = r#"
    [[protocols]]
    name = "hauppauge"
    protocol = "raw"
    [[protocols.raw]]
    keycode = 'KEY_POWER'
    raw = '+100 -100'
    "#;

    assert_eq!(
        Keymap::parse_text(s, Path::new("x.toml")),
        Err("x.toml: raw keymaps have no scancodes".to_string())
    );

    let s = r#"
    [[protocols]]
    name = "nec"
    protocol = "nec"
    rc_protocol = 100000
    "#;

    assert_eq!(
        Keymap::parse_text(s, Path::new("x.toml")),
        Err("x.toml: rc_protocol 100000 must be 16 bit value".to_string())
    );

    let s = r#"
    [[protocols]]
    name = "nec"
    protocol = "nec"
    [protocols.scancodes]
    0xzz = "KEY_OK"
    "#;

    assert_eq!(
        Keymap::parse_text(s, Path::new("x.toml")),
        Err("x.toml: 0xzz is a not valid scancode".to_string())
    );

    assert_eq!(
        Keymap::parse_text("[foo]", Path::new("x.toml")),
        Err("x.toml: missing top level protocols array".to_string())
    );
}

#[test]
fn parse_text_test() {
    let s = r#"
    # table hauppauge, type: RC5
    0x1e3b KEY_SELECT
    0x1e3d KEY_POWER2
    0x1e1c KEY_TV
    "#;

    let k = Keymap::parse_text(s, Path::new("hauppauge")).unwrap();

    assert_eq!(k[0].name, "hauppauge");
    assert_eq!(k[0].protocol, "RC5");
    assert_eq!(k[0].variant, None);
    for s in &k[0].scancodes {
        match (s.0, s.1.as_str()) {
            (0x1e3b, "KEY_SELECT") | (0x1e3d, "KEY_POWER2") | (0x1e1c, "KEY_TV") => {}
            _ => panic!("{s:?} not expected"),
        }
    }

    let s = r#"
    # table: rc6_mce, type: RC6, foo
    0x800f0400 KEY_NUMERIC_0
    0x800f0401 KEY_NUMERIC_1
    # foobar
    0x800f0402 KEY_NUMERIC_2

    0x800f0403 KEY_NUMERIC_3
    "#;

    let k = Keymap::parse_text(s, Path::new("hauppauge")).unwrap();

    assert_eq!(k[0].name, "rc6_mce");
    assert_eq!(k[0].protocol, "RC6");
    assert_eq!(k[1].protocol, "foo");
    assert_eq!(k[0].variant, None);
    assert_eq!(k[0].scancodes.len(), 4);
    assert!(k[1].scancodes.is_empty());

    let s = r#"
    # table streamzap, type: RC-5-SZ
    0x28c0 KEY_NUMERIC_0
    0x28c1 KEY_NUMERIC_1
    0x28c2 KEY_NUMERIC_2
    "#;

    let k = Keymap::parse_text(s, Path::new("hauppauge")).unwrap();

    assert_eq!(k[0].name, "streamzap");
    assert_eq!(k[0].protocol, "RC-5-SZ");
    assert_eq!(k[0].protocol_no(), 4);

    let s = r#"
    # table big, type: NEC
    0x10000000000000000 KEY_OK
    "#;

    assert!(Keymap::parse_text(s, Path::new("big")).is_err());
}
