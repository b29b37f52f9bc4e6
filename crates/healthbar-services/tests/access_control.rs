//! Profiles, grants and guarded cross-patient reads.

mod common;

use axum::http::StatusCode;
use common::{Harness, assert_envelope};
use healthbar_services::ServiceKind;
use serde_json::json;

fn visit_body() -> serde_json::Value {
    json!({
        "hospital_name": "General",
        "visit_date": "2024-03-01",
        "reason": "checkup",
        "notes": "all fine"
    })
}

#[tokio::test]
async fn test_profile_roundtrip() {
    let h = Harness::new().await;
    let (patient, profile_id) = h.patient("p@x").await;

    let fetched = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/profile",
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    let data = &fetched.json()["data"];
    assert_eq!(data["id"], profile_id.as_str());
    assert_eq!(data["user_id"], patient.user_id.as_str());
    assert_eq!(data["full_name"], "Pat Example");
    assert_eq!(data["date_of_birth"], "1990-04-12");
    assert_eq!(data["address"], "1 Main St");

    let again = h
        .call(
            ServiceKind::Patient,
            "POST",
            "/api/patients/profile",
            Some(&patient.token),
            Some(json!({"full_name": "Twice", "date_of_birth": "1990-04-12"})),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.json()["error"], "Profile already exists");

    let updated = h
        .call(
            ServiceKind::Patient,
            "PUT",
            "/api/patients/profile",
            Some(&patient.token),
            Some(json!({"full_name": "Pat Renamed", "date_of_birth": "1990-04-13"})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["data"]["full_name"], "Pat Renamed");
    assert_eq!(updated.json()["data"]["phone"], "");
}

#[tokio::test]
async fn test_profile_validation() {
    let h = Harness::new().await;
    let patient = h.register("p@x", "patient").await;

    let missing = h
        .call(
            ServiceKind::Patient,
            "POST",
            "/api/patients/profile",
            Some(&patient.token),
            Some(json!({"full_name": "No Birthday"})),
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()["error"], "Full name and date of birth are required");

    let bad_date = h
        .call(
            ServiceKind::Patient,
            "POST",
            "/api/patients/profile",
            Some(&patient.token),
            Some(json!({"full_name": "X", "date_of_birth": "12/04/1990"})),
        )
        .await;
    assert_eq!(bad_date.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_date.json()["error"], "Invalid date format. Use YYYY-MM-DD");

    let none_yet = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/profile",
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(none_yet.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_gates() {
    let h = Harness::new().await;
    let (doctor, _) = h.doctor("d@x").await;
    let (patient, _) = h.patient("p@x").await;

    let doctor_as_patient = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/profile",
            Some(&doctor.token),
            None,
        )
        .await;
    assert_eq!(doctor_as_patient.status, StatusCode::FORBIDDEN);
    assert_eq!(
        doctor_as_patient.json()["error"],
        "Only patients can view their profile"
    );

    let patient_as_doctor = h
        .call(
            ServiceKind::Doctor,
            "GET",
            "/api/doctors/patients",
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(patient_as_doctor.status, StatusCode::FORBIDDEN);
    assert_envelope(&patient_as_doctor);

    let doctor_adds_visit = h
        .call(
            ServiceKind::Timeline,
            "POST",
            "/api/timeline/visits",
            Some(&doctor.token),
            Some(visit_body()),
        )
        .await;
    assert_eq!(doctor_adds_visit.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_doctor_without_grant_is_denied() {
    let h = Harness::new().await;
    let (_patient, patient_id) = h.patient("p@x").await;
    let (doctor, _) = h.doctor("d@x").await;

    let timeline = h
        .call(
            ServiceKind::Timeline,
            "GET",
            &format!("/api/timeline/patient?patient_id={patient_id}"),
            Some(&doctor.token),
            None,
        )
        .await;
    assert_eq!(timeline.status, StatusCode::FORBIDDEN);
    assert_eq!(timeline.json()["error"], "Access denied");

    // Unknown patients are indistinguishable from denied ones.
    let ghost = h
        .call(
            ServiceKind::Timeline,
            "GET",
            "/api/timeline/patient?patient_id=does-not-exist",
            Some(&doctor.token),
            None,
        )
        .await;
    assert_eq!(ghost.status, StatusCode::FORBIDDEN);
    assert_eq!(ghost.json(), timeline.json());
}

#[tokio::test]
async fn test_grant_then_revoke_controls_doctor_reads() {
    let h = Harness::new().await;
    let (patient, patient_id) = h.patient("p@x").await;
    let (doctor, doctor_id) = h.doctor("d@x").await;

    let added = h
        .call(
            ServiceKind::Timeline,
            "POST",
            "/api/timeline/visits",
            Some(&patient.token),
            Some(visit_body()),
        )
        .await;
    assert_eq!(added.status, StatusCode::CREATED);

    h.grant(&patient, &doctor_id).await;
    let uri = format!("/api/timeline/patient?patient_id={patient_id}");
    let allowed = h
        .call(ServiceKind::Timeline, "GET", &uri, Some(&doctor.token), None)
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.json()["data"].as_array().unwrap().len(), 1);

    let listed = h
        .call(
            ServiceKind::Doctor,
            "GET",
            "/api/doctors/patients",
            Some(&doctor.token),
            None,
        )
        .await;
    assert_eq!(listed.json()["data"][0]["id"], patient_id.as_str());

    let viewed = h
        .call(
            ServiceKind::Doctor,
            "GET",
            &format!("/api/doctors/patients/view?patient_id={patient_id}"),
            Some(&doctor.token),
            None,
        )
        .await;
    assert_eq!(viewed.status, StatusCode::OK);
    assert_eq!(viewed.json()["message"], "Patient profile retrieved");

    h.revoke(&patient, &doctor_id).await;
    let denied = h
        .call(ServiceKind::Timeline, "GET", &uri, Some(&doctor.token), None)
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let permissions = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/permissions",
            Some(&patient.token),
            None,
        )
        .await;
    let grants = permissions.json()["data"].as_array().unwrap().clone();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["is_active"], false);
    assert!(grants[0]["revoked_at"].is_string());
}

#[tokio::test]
async fn test_grant_and_revoke_edge_cases() {
    let h = Harness::new().await;
    let (patient, _) = h.patient("p@x").await;
    let (_doctor, doctor_id) = h.doctor("d@x").await;

    // Revoking a grant that never existed succeeds.
    h.revoke(&patient, &doctor_id).await;

    let unknown = h
        .call(
            ServiceKind::Patient,
            "POST",
            "/api/patients/permissions/grant",
            Some(&patient.token),
            Some(json!({"doctor_id": "no-such-doctor"})),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let empty = h
        .call(
            ServiceKind::Patient,
            "POST",
            "/api/patients/permissions/grant",
            Some(&patient.token),
            Some(json!({})),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.json()["error"], "Doctor ID is required");

    h.grant(&patient, &doctor_id).await;
    h.grant(&patient, &doctor_id).await;
    let permissions = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/permissions",
            Some(&patient.token),
            None,
        )
        .await;
    let grants = permissions.json()["data"].as_array().unwrap().clone();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["is_active"], true);
}

#[tokio::test]
async fn test_doctor_can_read_but_not_modify_visits() {
    let h = Harness::new().await;
    let (patient, _) = h.patient("p@x").await;
    let (doctor, doctor_id) = h.doctor("d@x").await;
    h.grant(&patient, &doctor_id).await;

    let added = h
        .call(
            ServiceKind::Timeline,
            "POST",
            "/api/timeline/visits",
            Some(&patient.token),
            Some(visit_body()),
        )
        .await;
    let visit_id = added.json()["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/timeline/visit?visit_id={visit_id}");

    let read = h
        .call(ServiceKind::Timeline, "GET", &uri, Some(&doctor.token), None)
        .await;
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.json()["data"]["reason"], "checkup");

    let update = h
        .call(
            ServiceKind::Timeline,
            "PUT",
            &uri,
            Some(&doctor.token),
            Some(visit_body()),
        )
        .await;
    assert_eq!(update.status, StatusCode::FORBIDDEN);

    let delete = h
        .call(ServiceKind::Timeline, "DELETE", &uri, Some(&doctor.token), None)
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_patient_manages_own_visits() {
    let h = Harness::new().await;
    let (patient, _) = h.patient("p@x").await;
    let (other, _) = h.patient("q@x").await;

    let added = h
        .call(
            ServiceKind::Timeline,
            "POST",
            "/api/timeline/visits",
            Some(&patient.token),
            Some(visit_body()),
        )
        .await;
    assert_eq!(added.status, StatusCode::CREATED);
    let visit_id = added.json()["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/timeline/visit?visit_id={visit_id}");

    let mut changed = visit_body();
    changed["reason"] = json!("follow-up");
    let updated = h
        .call(ServiceKind::Timeline, "PUT", &uri, Some(&patient.token), Some(changed))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["data"]["reason"], "follow-up");

    let foreign = h
        .call(ServiceKind::Timeline, "DELETE", &uri, Some(&other.token), None)
        .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let deleted = h
        .call(ServiceKind::Timeline, "DELETE", &uri, Some(&patient.token), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = h
        .call(ServiceKind::Timeline, "GET", &uri, Some(&patient.token), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.json()["error"], "Visit not found");

    let invalid = h
        .call(
            ServiceKind::Timeline,
            "POST",
            "/api/timeline/visits",
            Some(&patient.token),
            Some(json!({"hospital_name": "General"})),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    let mine = h
        .call(
            ServiceKind::Timeline,
            "GET",
            "/api/timeline/my",
            Some(&patient.token),
            None,
        )
        .await;
    assert_eq!(mine.status, StatusCode::OK);
    assert!(mine.json()["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_own_profile_endpoints_are_scoped_to_caller() {
    let h = Harness::new().await;
    let (first, first_id) = h.patient("first@x").await;
    let (second, second_id) = h.patient("second@x").await;

    let updated = h
        .call(
            ServiceKind::Patient,
            "PUT",
            "/api/patients/profile",
            Some(&second.token),
            Some(json!({"full_name": "Second Renamed", "date_of_birth": "1991-01-01"})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["data"]["id"], second_id.as_str());

    let fetched = h
        .call(
            ServiceKind::Patient,
            "GET",
            "/api/patients/profile",
            Some(&first.token),
            None,
        )
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["data"]["id"], first_id.as_str());
    assert_eq!(fetched.json()["data"]["full_name"], "Pat Example");

    // Without a profile there is nothing for the guard to clear.
    let bare = h.register("bare@x", "patient").await;
    for (method, body) in [
        ("GET", None),
        (
            "PUT",
            Some(json!({"full_name": "Nobody", "date_of_birth": "1990-01-01"})),
        ),
    ] {
        let reply = h
            .call(
                ServiceKind::Patient,
                method,
                "/api/patients/profile",
                Some(&bare.token),
                body,
            )
            .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{method}");
        assert_eq!(reply.json()["error"], "Profile not found");
        assert_envelope(&reply);
    }
}
