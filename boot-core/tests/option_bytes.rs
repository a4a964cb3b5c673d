use boot_core::option_bytes::{OptionBytes, OptionRegister, FIELDS, IMAGE_LEN, RDP_FIELD};
use boot_core::sim::{SimOptionBytes, OPTION_AREA_BASE};
use proptest::collection::vec;
use proptest::prelude::*;

const OB_END: u32 = 0x1FFF_787F;

fn expected_writes(data: &[u8], length: usize) -> Vec<(OptionRegister, u32)> {
    let mut writes = vec![(RDP_FIELD.register, data[0] as u32)];
    writes.extend(
        FIELDS
            .iter()
            .filter(|field| length.min(data.len()) >= field.end)
            .map(|field| (field.register, field.pack(data))),
    );
    writes
}

proptest! {
    #[test]
    fn field_written_iff_length_reaches_it(
        data in vec(any::<u8>(), IMAGE_LEN),
        length in 0usize..=IMAGE_LEN + 8,
    ) {
        let mut sim = SimOptionBytes::default();
        OptionBytes::new(&mut sim, OPTION_AREA_BASE, OB_END).write(&data, length);

        prop_assert_eq!(sim.writes(), &expected_writes(&data, length)[..]);
        prop_assert!(sim.started());
    }

    #[test]
    fn short_buffers_never_read_past_their_end(
        data in vec(any::<u8>(), 1..IMAGE_LEN),
        length in 0usize..=2 * IMAGE_LEN,
    ) {
        let mut sim = SimOptionBytes::default();
        OptionBytes::new(&mut sim, OPTION_AREA_BASE, OB_END).write(&data, length);

        prop_assert_eq!(sim.writes(), &expected_writes(&data, length)[..]);
    }

    #[test]
    fn committed_fields_read_back(
        data in vec(any::<u8>(), IMAGE_LEN),
        latency in 0u32..20,
    ) {
        let mut sim = SimOptionBytes::with_commit_latency(latency);
        let mut ob = OptionBytes::new(&mut sim, OPTION_AREA_BASE, OB_END);
        ob.write(&data, IMAGE_LEN);
        while ob.busy() {}

        for field in FIELDS.iter() {
            for &(index, _) in field.lanes() {
                prop_assert_eq!(ob.read(OPTION_AREA_BASE + index as u32), data[index]);
            }
        }
    }
}

#[test]
fn scenario_length_ten() {
    let mut data = [0u8; IMAGE_LEN];
    data[0] = 0xAA;
    data[1] = 0xF8;
    data[2] = 0xFF;
    data[3] = 0xDE;
    data[8] = 0x12;
    data[9] = 0x34;
    data[16] = 0x56;

    let mut sim = SimOptionBytes::default();
    OptionBytes::new(&mut sim, OPTION_AREA_BASE, OB_END).write(&data, 10);

    assert_eq!(
        sim.writes(),
        &[
            (OptionRegister::Optr, 0xAA),
            (OptionRegister::Optr, 0xDEFF_F8AA),
            (OptionRegister::Pcrop1Asr, 0x3412),
        ]
    );
}
