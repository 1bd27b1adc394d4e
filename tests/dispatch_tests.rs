//! Dispatch and motion validation tests
//!
//! These tests build small worlds by hand and drive the dispatch pass and
//! the motion engine directly.

use ambulance_sim::simulation::{
    AmbulanceState, HouseId, PatientId, Position, SimConfig, SimWorld,
};

const MOTION_DELTA: f32 = 0.025;

fn world_with_step(step: f32) -> SimWorld {
    let mut config = SimConfig::empty();
    config.ambulance_step = step;
    SimWorld::new(config)
}

fn place_patient(world: &mut SimWorld, house: HouseId) -> PatientId {
    let patient = world.synthesize_patient();
    let patient_id = patient.id.clone();
    world.admit_patient(patient, Some(house)).unwrap();
    patient_id
}

#[test]
fn test_ambulance_reaches_house_after_exact_tick_count() {
    let mut world = world_with_step(4.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(100.0, 0.0));
    let ambulance = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let patient_id = place_patient(&mut world, house);

    assert_eq!(world.assign_ambulances(), 1);
    assert!(world.houses[&house].ambulance_en_route);

    for _ in 0..24 {
        world.move_ambulances(MOTION_DELTA);
    }
    let amb = &world.ambulances[&ambulance];
    assert!(matches!(amb.state, AmbulanceState::DispatchedToHouse { .. }));
    assert_eq!(amb.position, Position::new(96.0, 0.0));

    world.move_ambulances(MOTION_DELTA);
    let amb = &world.ambulances[&ambulance];
    assert_eq!(amb.position, Position::new(100.0, 0.0));
    assert_eq!(amb.carried_patient(), Some(&patient_id));
    assert!(matches!(amb.state, AmbulanceState::Transporting { hospital: h, .. } if h == hospital));

    let house = &world.houses[&house];
    assert!(!house.has_patient());
    assert!(!house.ambulance_en_route);
    assert_eq!(world.stats.pickups, 1);
}

#[test]
fn test_nearest_idle_ambulance_is_chosen() {
    let mut world = world_with_step(2.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(100.0, 100.0));
    let far = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let near = world.add_ambulance(Position::new(90.0, 100.0), Some(hospital));
    place_patient(&mut world, house);

    world.assign_ambulances();

    assert!(world.ambulances[&far].is_idle());
    assert!(matches!(
        world.ambulances[&near].state,
        AmbulanceState::DispatchedToHouse { house: h, .. } if h == house
    ));
}

#[test]
fn test_equidistant_ambulances_prefer_lowest_id() {
    let mut world = world_with_step(2.0);
    world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(50.0, 0.0));
    let first = world.add_ambulance(Position::new(0.0, 0.0), None);
    let second = world.add_ambulance(Position::new(100.0, 0.0), None);
    place_patient(&mut world, house);

    assert_eq!(world.nearest_idle_ambulance(&Position::new(50.0, 0.0)), Some(first));
    world.assign_ambulances();
    assert!(!world.ambulances[&first].is_idle());
    assert!(world.ambulances[&second].is_idle());
}

#[test]
fn test_house_waits_when_no_ambulance_is_idle() {
    let mut world = world_with_step(10.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let first_house = world.add_house(Position::new(20.0, 0.0));
    let second_house = world.add_house(Position::new(0.0, 40.0));
    let ambulance = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    place_patient(&mut world, first_house);
    place_patient(&mut world, second_house);

    assert_eq!(world.assign_ambulances(), 1);
    assert!(world.houses[&first_house].ambulance_en_route);
    assert!(!world.houses[&second_house].ambulance_en_route);
    assert!(world.validate().is_empty());

    // Deliver the first patient, then the second house gets the ambulance
    for _ in 0..10 {
        world.move_ambulances(MOTION_DELTA);
    }
    assert!(world.ambulances[&ambulance].is_idle());
    assert_eq!(world.assign_ambulances(), 1);
    assert!(world.houses[&second_house].ambulance_en_route);
}

#[test]
fn test_house_with_several_patients_is_reoffered_after_pickup() {
    let mut world = world_with_step(5.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(50.0, 0.0));
    let first = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let second = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let p1 = place_patient(&mut world, house);
    let p2 = place_patient(&mut world, house);

    // One ambulance per house at a time
    assert_eq!(world.assign_ambulances(), 1);
    assert!(world.ambulances[&second].is_idle());

    for _ in 0..10 {
        world.move_ambulances(MOTION_DELTA);
    }

    // Pickup takes the head of the list and immediately sends the next ambulance
    assert_eq!(world.ambulances[&first].carried_patient(), Some(&p1));
    assert!(matches!(
        &world.ambulances[&second].state,
        AmbulanceState::DispatchedToHouse { patient, .. } if *patient == p2
    ));
    assert!(world.houses[&house].ambulance_en_route);
    assert!(world.validate().is_empty());
}

#[test]
fn test_no_dispatch_without_hospitals() {
    let mut world = world_with_step(2.0);
    let house = world.add_house(Position::new(10.0, 0.0));
    let ambulance = world.add_ambulance(Position::new(0.0, 0.0), None);
    place_patient(&mut world, house);

    assert_eq!(world.assign_ambulances(), 0);
    assert!(world.ambulances[&ambulance].is_idle());
    assert!(!world.houses[&house].ambulance_en_route);
}

#[test]
fn test_ambulance_idles_at_hospital_after_dropoff() {
    let mut world = world_with_step(5.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(0.0, 30.0));
    let ambulance = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    let patient_id = place_patient(&mut world, house);

    world.assign_ambulances();
    for _ in 0..12 {
        world.move_ambulances(MOTION_DELTA);
    }

    let amb = &world.ambulances[&ambulance];
    assert!(amb.is_idle());
    assert_eq!(amb.position, Position::new(0.0, 0.0));
    assert_eq!(world.hospitals[&hospital].waiting.front(), Some(&patient_id));
    assert_eq!(world.patients[&patient_id].wait_time, 0);
    assert_eq!(world.stats.dropoffs, 1);
}

#[test]
fn test_diagonal_moves_never_overshoot() {
    let mut world = world_with_step(3.0);
    let hospital = world.add_hospital(Position::new(0.0, 0.0));
    let house = world.add_house(Position::new(7.0, 20.0));
    let ambulance = world.add_ambulance(Position::new(0.0, 0.0), Some(hospital));
    place_patient(&mut world, house);
    world.assign_ambulances();

    for _ in 0..6 {
        world.move_ambulances(MOTION_DELTA);
        let pos = world.ambulances[&ambulance].position;
        assert!(pos.x <= 7.0 && pos.y <= 20.0, "overshot to {pos:?}");
    }
    assert_eq!(world.ambulances[&ambulance].position, Position::new(7.0, 18.0));
}

#[test]
fn test_manual_patient_ignored_when_house_is_occupied() {
    let mut world = world_with_step(2.0);
    let house = world.add_house(Position::new(0.0, 0.0));

    let first = world.create_patient_at_house(house).unwrap();
    assert!(first.is_some());
    let second = world.create_patient_at_house(house).unwrap();
    assert!(second.is_none());
    assert_eq!(world.houses[&house].patient_ids.len(), 1);
    assert_eq!(world.stats.patients_generated, 1);
}

#[test]
fn test_manual_patient_at_unknown_house_is_an_error() {
    let mut world = world_with_step(2.0);
    world.add_house(Position::new(0.0, 0.0));

    let result = world.create_patient_at_house(HouseId(42));
    assert!(result.is_err());
    assert!(world.patients.is_empty());
}

#[test]
fn test_generated_patient_without_houses_is_rejected() {
    let mut world = world_with_step(2.0);
    let patient = world.synthesize_patient();

    assert!(world.admit_patient(patient, None).is_err());
    assert!(world.patients.is_empty());
    assert_eq!(world.stats.patients_generated, 0);
}

#[test]
fn test_repeated_patient_id_is_rekeyed() {
    let mut world = world_with_step(2.0);
    let house = world.add_house(Position::new(0.0, 0.0));
    let mut first = world.synthesize_patient();
    first.rekey(PatientId::new("synthea-1"));
    let mut second = world.synthesize_patient();
    second.rekey(PatientId::new("synthea-1"));
    let second_name = second.name.clone();

    let first_id = world.admit_patient(first, Some(house)).unwrap();
    let second_id = world.admit_patient(second, Some(house)).unwrap();

    assert_eq!(first_id, PatientId::new("synthea-1"));
    assert_ne!(second_id, first_id);
    assert!(second_id.as_str().starts_with("pat-"));
    assert_eq!(world.patients.len(), 2);
    assert_eq!(
        world.houses[&house].patient_ids.iter().cloned().collect::<Vec<_>>(),
        vec![first_id, second_id.clone()]
    );

    let rekeyed = &world.patients[&second_id];
    assert_eq!(rekeyed.name, second_name);
    assert_eq!(rekeyed.identity.id, second_id);
    assert_eq!(rekeyed.condition.subject_reference, format!("Patient/{second_id}"));
    assert!(world.validate().is_empty(), "{:?}", world.validate());
    assert_eq!(world.stats.patients_generated, 2);
}
