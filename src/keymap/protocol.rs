use super::LinuxProtocol;

impl LinuxProtocol {
    /// Match protocol name without regard for spaces or dashes or underscores.
    /// Behaviour should match protocol_match() in ir-ctl
    pub fn find_like(name: &str) -> Option<&'static LinuxProtocol> {
        let str_like = |name: &str| -> String {
            name.chars()
                .filter_map(|ch| {
                    if matches!(ch, ' ' | '-' | '_') || !ch.is_ascii() {
                        None
                    } else {
                        Some(ch.to_ascii_lowercase())
                    }
                })
                .collect::<String>()
        };

        let name = str_like(name);

        LINUX_PROTOCOLS.iter().find(|e| str_like(e.name) == name)
    }
}

/// Protocols known to the kernel, with the scancode bits each can carry
const LINUX_PROTOCOLS: &[LinuxProtocol] = &[
    LinuxProtocol {
        name: "other",
        scancode_mask: u32::MAX,
        protocol_no: 1,
    },
    LinuxProtocol {
        name: "rc5",
        scancode_mask: 0x1f7f,
        protocol_no: 2,
    },
    LinuxProtocol {
        name: "rc5x_20",
        scancode_mask: 0x1f7f3f,
        protocol_no: 3,
    },
    LinuxProtocol {
        name: "rc5_sz",
        scancode_mask: 0x2fff,
        protocol_no: 4,
    },
    LinuxProtocol {
        name: "jvc",
        scancode_mask: 0xffff,
        protocol_no: 5,
    },
    LinuxProtocol {
        name: "sony12",
        scancode_mask: 0x1f007f,
        protocol_no: 6,
    },
    LinuxProtocol {
        name: "sony15",
        scancode_mask: 0xff007f,
        protocol_no: 7,
    },
    LinuxProtocol {
        name: "sony20",
        scancode_mask: 0x1fff7f,
        protocol_no: 8,
    },
    LinuxProtocol {
        name: "nec",
        scancode_mask: 0xffff,
        protocol_no: 9,
    },
    LinuxProtocol {
        name: "necx",
        scancode_mask: 0xffffff,
        protocol_no: 10,
    },
    LinuxProtocol {
        name: "nec32",
        scancode_mask: 0xffff_ffff,
        protocol_no: 11,
    },
    LinuxProtocol {
        name: "sanyo",
        scancode_mask: 0x1fffff,
        protocol_no: 12,
    },
    LinuxProtocol {
        name: "mcir2-kbd",
        scancode_mask: u32::MAX,
        protocol_no: 13,
    },
    LinuxProtocol {
        name: "mcir2-mse",
        scancode_mask: u32::MAX,
        protocol_no: 14,
    },
    LinuxProtocol {
        name: "rc6_0",
        scancode_mask: 0xffff,
        protocol_no: 15,
    },
    LinuxProtocol {
        name: "rc6_6a_20",
        scancode_mask: 0xf_ffff,
        protocol_no: 16,
    },
    LinuxProtocol {
        name: "rc6_6a_24",
        scancode_mask: 0xff_ff_ff,
        protocol_no: 17,
    },
    LinuxProtocol {
        name: "rc6_6a_32",
        scancode_mask: 0xffff_ffff,
        protocol_no: 18,
    },
    LinuxProtocol {
        name: "rc6_mce",
        scancode_mask: 0xffff_7fff,
        protocol_no: 19,
    },
    LinuxProtocol {
        name: "sharp",
        scancode_mask: 0x1fff,
        protocol_no: 20,
    },
    LinuxProtocol {
        name: "xmp",
        scancode_mask: u32::MAX,
        protocol_no: 21,
    },
    LinuxProtocol {
        name: "cec",
        scancode_mask: u32::MAX,
        protocol_no: 22,
    },
    LinuxProtocol {
        name: "imon",
        scancode_mask: u32::MAX,
        protocol_no: 23,
    },
    LinuxProtocol {
        name: "rc-mm-12",
        scancode_mask: 0xfff,
        protocol_no: 24,
    },
    LinuxProtocol {
        name: "rc-mm-24",
        scancode_mask: 0xfff_fff,
        protocol_no: 25,
    },
    LinuxProtocol {
        name: "rc-mm-32",
        scancode_mask: 0xffff_ffff,
        protocol_no: 26,
    },
    LinuxProtocol {
        name: "xbox-dvd",
        scancode_mask: 0xfff,
        protocol_no: 27,
    },
];

#[test]
fn find_like() {
    let p = LinuxProtocol::find_like("rc6-mce").unwrap();
    assert_eq!(p.name, "rc6_mce");

    let p = LinuxProtocol::find_like("rcmm12").unwrap();
    assert_eq!(p.name, "rc-mm-12");

    let p = LinuxProtocol::find_like("sony-12").unwrap();
    assert_eq!(p.protocol_no, 6);

    assert!(LinuxProtocol::find_like("rc7").is_none());
    assert_eq!(LinuxProtocol::find_like("NEC").unwrap().scancode_mask, 0xffff);
}
