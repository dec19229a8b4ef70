mod test_client_greeting;
