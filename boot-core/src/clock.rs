//! Timer kernel clock from the RCC clock configuration registers.

use fugit::HertzU32;

const HSI16: u32 = 16_000_000;
const LSI: u32 = 32_000;
const LSE: u32 = 32_768;

const CR_HSIDIV_SHIFT: u32 = 11;
const CFGR_SWS_SHIFT: u32 = 3;
const CFGR_HPRE_SHIFT: u32 = 8;
const CFGR_PPRE_SHIFT: u32 = 12;

/// `SYSCLK` selected by `RCC_CFGR.SWS`. Zero for HSE and PLL, whose frequencies depend on the
/// board and are not known here.
pub fn sysclk(cr: u32, cfgr: u32) -> u32 {
    match (cfgr >> CFGR_SWS_SHIFT) & 0b111 {
        0 => HSI16 >> ((cr >> CR_HSIDIV_SHIFT) & 0b111),
        3 => LSI,
        4 => LSE,
        _ => 0,
    }
}

/// log2 of the AHB divider: `0xxx` is /1, `1000..1011` is /2../16, `1100..1111` is /64../512.
pub fn ahb_shift(cfgr: u32) -> u32 {
    match (cfgr >> CFGR_HPRE_SHIFT) & 0xF {
        0..=7 => 0,
        hpre @ 8..=11 => hpre - 7,
        hpre => hpre - 6,
    }
}

/// log2 of the APB divider: `0xx` is /1, `100..111` is /2../16.
pub fn apb_shift(cfgr: u32) -> u32 {
    match (cfgr >> CFGR_PPRE_SHIFT) & 0b111 {
        ppre @ 4..=7 => ppre - 3,
        _ => 0,
    }
}

/// Timers on APB run at twice `PCLK` whenever the APB prescaler divides.
pub fn timer_clock(cr: u32, cfgr: u32) -> HertzU32 {
    let apb = apb_shift(cfgr);
    let pclk = sysclk(cr, cfgr) >> ahb_shift(cfgr) >> apb;
    HertzU32::from_raw(if apb == 0 { pclk } else { pclk * 2 })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HSISYS: u32 = 0 << CFGR_SWS_SHIFT;

    fn hpre(code: u32) -> u32 {
        code << CFGR_HPRE_SHIFT
    }

    fn ppre(code: u32) -> u32 {
        code << CFGR_PPRE_SHIFT
    }

    #[test]
    fn reset_configuration_is_hsi16() {
        assert_eq!(timer_clock(0, 0).raw(), 16_000_000);
    }

    #[test]
    fn hsidiv_divides_sysclk() {
        assert_eq!(sysclk(0b011 << CR_HSIDIV_SHIFT, HSISYS), 2_000_000);
        assert_eq!(sysclk(0b111 << CR_HSIDIV_SHIFT, HSISYS), 125_000);
    }

    #[test]
    fn ahb_prescaler_codes() {
        assert_eq!(ahb_shift(hpre(0b0111)), 0);
        assert_eq!(ahb_shift(hpre(8)), 1);
        assert_eq!(ahb_shift(hpre(11)), 4);
        assert_eq!(ahb_shift(hpre(12)), 6);
        assert_eq!(ahb_shift(hpre(15)), 9);

        assert_eq!(timer_clock(0, hpre(8)).raw(), 8_000_000);
        assert_eq!(timer_clock(0, hpre(12)).raw(), 250_000);
    }

    #[test]
    fn divided_apb_doubles_timer_clock() {
        assert_eq!(apb_shift(ppre(0b011)), 0);
        assert_eq!(apb_shift(ppre(4)), 1);
        assert_eq!(apb_shift(ppre(7)), 4);

        // PCLK = 8 MHz, timers see 16 MHz.
        assert_eq!(timer_clock(0, ppre(4)).raw(), 16_000_000);
        // HCLK = 8 MHz, PCLK = 1 MHz, timers see 2 MHz.
        assert_eq!(timer_clock(0, hpre(8) | ppre(7)).raw(), 2_000_000);
    }

    #[test]
    fn unknown_sources_read_zero() {
        for &sws in &[1u32, 2] {
            assert_eq!(timer_clock(0, sws << CFGR_SWS_SHIFT).raw(), 0);
        }
        assert_eq!(timer_clock(0, 3 << CFGR_SWS_SHIFT).raw(), 32_000);
        assert_eq!(timer_clock(0, 4 << CFGR_SWS_SHIFT).raw(), 32_768);
    }
}
