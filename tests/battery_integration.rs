use approx::assert_abs_diff_eq;

use ev_charge_sim::battery::{BatterySim, BatterySimParameters, ChargeAlgorithm};
use ev_charge_sim::model::{CarBuilder, CarModel};

fn sim_at(soc: f64, algorithm: ChargeAlgorithm) -> BatterySim {
    let params = BatterySimParameters::default_params()
        .with_initial_soc(soc)
        .with_charge_algorithm(algorithm);
    BatterySim::new(params, false, 1.0).expect("soc within [0, 1]")
}

#[test]
fn forward_then_back_returns_to_the_start() {
    for algorithm in [ChargeAlgorithm::Cccv, ChargeAlgorithm::Cpcv] {
        let mut sim = sim_at(0.3, algorithm);
        for _ in 0..600 {
            sim.advance(96.0);
        }
        assert!(sim.soc() > 0.3);
        for _ in 0..600 {
            sim.rewind(96.0).expect("step > 0");
        }
        assert_eq!(sim.step(), 0);
        assert_abs_diff_eq!(sim.soc(), 0.3, epsilon = 1e-4);
        assert_abs_diff_eq!(sim.charged_ah(), 0.0, epsilon = 1e-4 * 65.6);
    }
}

#[test]
fn soc_rises_monotonically_and_stays_bounded() {
    let mut sim = sim_at(0.9, ChargeAlgorithm::Cccv);
    let mut previous = sim.soc();
    for _ in 0..4 * 3600 {
        sim.advance(500.0);
        assert!(sim.soc() >= previous);
        previous = sim.soc();
    }
    assert!(previous <= 1.0 + 1e-9, "soc overshoot: {previous}");
    assert!(previous > 0.99);
}

#[test]
fn nonlinear_car_tapers_below_its_request() {
    let mut car = CarBuilder::new(0)
        .model(CarModel::RenaultZoeZe40)
        .current_capacity(0.0)
        .build()
        .expect("valid car");
    let max = car.max_capacity;
    car.enable_nonlinear_charging(BatterySimParameters::default_params())
        .expect("battery attached");

    let request = car.max_current;
    let empty = car.accepted_current(request).expect("battery current");
    assert!(empty > 0.0 && empty <= request + 1e-9);

    car.cur_capacity = 0.995 * max;
    let almost_full = car.accepted_current(request).expect("battery current");
    assert!(almost_full < empty, "{almost_full} >= {empty}");
}
