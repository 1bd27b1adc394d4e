//! Hospital queue, ramping and redirect tests

use ambulance_sim::simulation::{
    AmbulanceState, HospitalId, PatientId, Position, RampPolicy, RecordRequest, SimConfig,
    SimWorld,
};

const MOTION_DELTA: f32 = 0.025;

fn test_config() -> SimConfig {
    let mut config = SimConfig::empty();
    config.ambulance_step = 5.0;
    config
}

/// Register a patient straight into a hospital's waiting room
fn queue_patient(world: &mut SimWorld, hospital: HospitalId) -> PatientId {
    let patient = world.synthesize_patient();
    let patient_id = patient.id.clone();
    world.patients.insert(patient_id.clone(), patient);
    world
        .hospitals
        .get_mut(&hospital)
        .unwrap()
        .waiting
        .push_back(patient_id.clone());
    patient_id
}

fn run_motion_until(world: &mut SimWorld, max_ticks: usize, done: impl Fn(&SimWorld) -> bool) {
    for _ in 0..max_ticks {
        if done(world) {
            return;
        }
        world.move_ambulances(MOTION_DELTA);
        assert!(world.validate().is_empty(), "{:?}", world.validate());
    }
    assert!(done(world), "condition not reached in {max_ticks} ticks");
}

#[test]
fn test_promotion_respects_treatment_capacity() {
    let mut config = test_config();
    config.max_treating_per_hospital = 2;
    let mut world = SimWorld::new(config);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let ids: Vec<PatientId> = (0..3).map(|_| queue_patient(&mut world, hospital)).collect();

    let requests = world.manage_hospital_queues();

    let h = &world.hospitals[&hospital];
    assert_eq!(h.treating, vec![ids[0].clone(), ids[1].clone()]);
    assert_eq!(h.waiting.iter().cloned().collect::<Vec<_>>(), vec![ids[2].clone()]);
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| matches!(r, RecordRequest::Encounter(req) if req.hospital_id == hospital)));
    assert_eq!(world.patients[&ids[0]].wait_time, 0);
    assert_eq!(world.patients[&ids[2]].wait_time, 1);
}

#[test]
fn test_promotion_waits_for_threshold() {
    let mut config = test_config();
    config.waiting_time_threshold = 3;
    let mut world = SimWorld::new(config);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let patient_id = queue_patient(&mut world, hospital);

    world.manage_hospital_queues();
    world.manage_hospital_queues();
    assert!(world.hospitals[&hospital].treating.is_empty());

    world.manage_hospital_queues();
    assert_eq!(world.hospitals[&hospital].treating, vec![patient_id]);
}

#[test]
fn test_patients_are_treated_in_arrival_order() {
    let mut config = test_config();
    config.max_treating_per_hospital = 1;
    config.treating_duration = 1;
    let mut world = SimWorld::new(config);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let a = queue_patient(&mut world, hospital);
    let b = queue_patient(&mut world, hospital);
    let c = queue_patient(&mut world, hospital);

    for _ in 0..3 {
        world.manage_hospital_queues();
    }

    let h = &world.hospitals[&hospital];
    assert_eq!(h.discharged, vec![a, b]);
    assert_eq!(h.treating, vec![c]);
    assert!(h.waiting.is_empty());
}

#[test]
fn test_discharge_after_treating_duration() {
    let mut config = test_config();
    config.treating_duration = 3;
    let mut world = SimWorld::new(config);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let patient_id = queue_patient(&mut world, hospital);

    let first = world.manage_hospital_queues();
    assert!(matches!(first.as_slice(), [RecordRequest::Encounter(_)]));
    world.resolve_records_locally(first);

    world.manage_hospital_queues();
    world.manage_hospital_queues();
    assert_eq!(world.hospitals[&hospital].treating, vec![patient_id.clone()]);

    let last = world.manage_hospital_queues();
    assert!(matches!(
        last.as_slice(),
        [RecordRequest::Discharge { patient_id: p, .. }] if *p == patient_id
    ));
    world.resolve_records_locally(last);

    let h = &world.hospitals[&hospital];
    assert!(h.treating.is_empty());
    assert_eq!(h.discharged, vec![patient_id.clone()]);
    assert_eq!(world.stats.patients_discharged, 1);

    let patient = &world.patients[&patient_id];
    assert_eq!(patient.hospital_secs, 4);
    assert_eq!(patient.encounters.len(), 2);
    assert_eq!(patient.encounters[0].id, patient.encounters[1].id);
    assert!(patient.encounters[1].is_discharge());
}

/// One house next to one hospital, with the patient already on board
fn world_with_patient_en_route(config: SimConfig) -> (SimWorld, HospitalId, PatientId) {
    let mut world = SimWorld::new(config);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(20.0, 0.0));
    world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let patient = world.synthesize_patient();
    let patient_id = patient.id.clone();
    world.admit_patient(patient, Some(house)).unwrap();
    world.assign_ambulances();
    (world, hospital, patient_id)
}

#[test]
fn test_full_waiting_room_ramps_and_keeps_patient() {
    let mut config = test_config();
    config.hospital_waiting_capacity = 0;
    let (mut world, hospital, patient_id) = world_with_patient_en_route(config);

    run_motion_until(&mut world, 50, |w| w.ramp_queue_len(hospital) == 1);

    let ambulance = world.ambulances.values().next().unwrap();
    assert!(matches!(ambulance.state, AmbulanceState::Ramping { hospital: h, .. } if h == hospital));
    assert_eq!(ambulance.carried_patient(), Some(&patient_id));
    assert!(!ambulance.is_idle());

    let h = &world.hospitals[&hospital];
    assert!(!h.holds(&patient_id));
    assert_eq!(world.stats.ramp_events, 1);

    // Ramped ambulances stay parked
    for _ in 0..20 {
        world.move_ambulances(MOTION_DELTA);
    }
    assert_eq!(world.ramp_queue_len(hospital), 1);
}

#[test]
fn test_ramp_drains_when_waiting_room_frees_up() {
    let mut config = test_config();
    config.hospital_waiting_capacity = 0;
    let (mut world, hospital, patient_id) = world_with_patient_en_route(config);
    run_motion_until(&mut world, 50, |w| w.ramp_queue_len(hospital) == 1);

    world.hospitals.get_mut(&hospital).unwrap().waiting_capacity = 1;
    world.manage_hospital_queues();

    let ambulance = world.ambulances.values().next().unwrap();
    assert!(ambulance.is_idle());
    assert_eq!(ambulance.position, Position::new(0.0, 0.0));
    assert_eq!(
        world.hospitals[&hospital].waiting.front(),
        Some(&patient_id)
    );
    assert!(world.validate().is_empty());
}

#[test]
fn test_longest_ramped_ambulance_unloads_first() {
    let mut world = SimWorld::new(test_config());
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let late = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let early = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));

    for (ambulance, since) in [(late, 5.0), (early, 2.0)] {
        let patient = world.synthesize_patient();
        let patient_id = patient.id.clone();
        world.patients.insert(patient_id.clone(), patient);
        world.ambulances.get_mut(&ambulance).unwrap().state = AmbulanceState::Ramping {
            hospital,
            destination: Position::new(0.0, 0.0),
            patient: patient_id,
            since,
            redirected: false,
        };
    }
    world.hospitals.get_mut(&hospital).unwrap().waiting_capacity = 1;

    assert_eq!(world.drain_ramp(hospital), 1);
    assert!(world.ambulances[&early].is_idle());
    assert!(!world.ambulances[&late].is_idle());
    assert_eq!(world.ramp_queue_len(hospital), 1);
}

#[test]
fn test_redirect_goes_to_other_hospital_once() {
    let mut config = test_config();
    config.ramp_policy = RampPolicy::Redirect;
    let mut world = SimWorld::new(config);
    let near = world.add_hospital(Position::new(0.0, 0.0));
    let far = world.add_hospital(Position::new(100.0, 0.0));
    let house = world.add_house(Position::new(0.0, 20.0));
    world.add_ambulance(Position::new(0.0, 0.0), Some(near));
    world.hospitals.get_mut(&near).unwrap().waiting_capacity = 0;
    let patient = world.synthesize_patient();
    let patient_id = patient.id.clone();
    world.admit_patient(patient, Some(house)).unwrap();
    world.assign_ambulances();

    run_motion_until(&mut world, 50, |w| {
        matches!(
            w.ambulances.values().next().map(|a| &a.state),
            Some(AmbulanceState::Transporting { hospital, redirected: true, .. }) if *hospital == far
        )
    });
    assert_eq!(world.stats.redirects, 1);

    run_motion_until(&mut world, 100, |w| w.ambulances.values().all(|a| a.is_idle()));
    assert_eq!(world.hospitals[&far].waiting.front(), Some(&patient_id));
    assert!(!world.hospitals[&near].holds(&patient_id));
}

#[test]
fn test_redirected_ambulance_ramps_when_second_hospital_is_full() {
    let mut config = test_config();
    config.ramp_policy = RampPolicy::Redirect;
    let mut world = SimWorld::new(config);
    let near = world.add_hospital(Position::new(0.0, 0.0));
    let far = world.add_hospital(Position::new(100.0, 0.0));
    let house = world.add_house(Position::new(0.0, 20.0));
    world.add_ambulance(Position::new(0.0, 0.0), Some(near));
    world.hospitals.get_mut(&near).unwrap().waiting_capacity = 0;
    let patient = world.synthesize_patient();
    world.admit_patient(patient, Some(house)).unwrap();
    world.assign_ambulances();

    run_motion_until(&mut world, 50, |w| w.stats.redirects == 1);
    // The second hospital fills up while the ambulance is on its way
    world.hospitals.get_mut(&far).unwrap().waiting_capacity = 0;

    run_motion_until(&mut world, 100, |w| w.ramp_queue_len(far) == 1);
    assert_eq!(world.stats.redirects, 1);
    assert_eq!(world.ramp_queue_len(near), 0);
}

#[test]
fn test_redirect_without_alternative_ramps_in_place() {
    let mut config = test_config();
    config.ramp_policy = RampPolicy::Redirect;
    config.hospital_waiting_capacity = 0;
    let (mut world, hospital, _) = world_with_patient_en_route(config);

    run_motion_until(&mut world, 50, |w| w.ramp_queue_len(hospital) == 1);
    assert_eq!(world.stats.redirects, 0);
}

#[test]
fn test_redirect_prefers_shorter_ramp_queue() {
    let mut world = SimWorld::new(test_config());
    let full = world.add_hospital(Position::new(0.0, 0.0));
    let close = world.add_hospital(Position::new(10.0, 0.0));
    let distant = world.add_hospital(Position::new(50.0, 0.0));
    let parked = world.add_ambulance(Position::new(10.0, 0.0), Some(close));
    let patient = world.synthesize_patient();
    let patient_id = patient.id.clone();
    world.patients.insert(patient_id.clone(), patient);
    world.ambulances.get_mut(&parked).unwrap().state = AmbulanceState::Ramping {
        hospital: close,
        destination: Position::new(10.0, 0.0),
        patient: patient_id,
        since: 0.0,
        redirected: false,
    };

    let from = Position::new(0.0, 0.0);
    assert_eq!(
        world.redirect_candidate(full, &from).map(|(id, _)| id),
        Some(distant)
    );
}
